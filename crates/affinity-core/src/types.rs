//! Shared types used across the affinity placement crates.
//!
//! Everything here is plain data. Algorithms that need to mutate host
//! counters or placements work on their own clones.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Logical service name (replica suffixes already stripped).
pub type ServiceId = String;

/// Unique identifier for a host in the cluster.
pub type HostId = String;

/// Identifier of a group inside a [`Partition`].
pub type GroupId = u32;

/// Per-service resource requests.
pub type Demands = HashMap<ServiceId, ResourceDemand>;

// ── Resources ──────────────────────────────────────────────────────

/// CPU and RAM requested by a service or a group of services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDemand {
    pub cpu: f64,
    pub ram: f64,
}

impl ResourceDemand {
    pub fn new(cpu: f64, ram: f64) -> Self {
        Self { cpu, ram }
    }

    /// Compare two demands by CPU first, then RAM.
    pub fn footprint_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cpu
            .total_cmp(&other.cpu)
            .then(self.ram.total_cmp(&other.ram))
    }

    /// Sum the demands of `services`. Unknown services count as zero.
    pub fn of_group<'a>(
        services: impl IntoIterator<Item = &'a ServiceId>,
        demands: &Demands,
    ) -> Self {
        services
            .into_iter()
            .map(|s| demands.get(s).copied().unwrap_or_default())
            .sum()
    }
}

impl Add for ResourceDemand {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            cpu: self.cpu + rhs.cpu,
            ram: self.ram + rhs.ram,
        }
    }
}

impl AddAssign for ResourceDemand {
    fn add_assign(&mut self, rhs: Self) {
        self.cpu += rhs.cpu;
        self.ram += rhs.ram;
    }
}

impl Sum for ResourceDemand {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Resource counters for a single host.
///
/// `available + used` is conserved per resource by [`reserve`](Self::reserve)
/// and [`release`](Self::release).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResources {
    pub host_id: HostId,
    pub available_cpu: f64,
    pub available_ram: f64,
    pub used_cpu: f64,
    pub used_ram: f64,
}

impl HostResources {
    pub fn new(
        host_id: impl Into<HostId>,
        available_cpu: f64,
        available_ram: f64,
        used_cpu: f64,
        used_ram: f64,
    ) -> Self {
        Self {
            host_id: host_id.into(),
            available_cpu,
            available_ram,
            used_cpu,
            used_ram,
        }
    }

    pub fn total_cpu(&self) -> f64 {
        self.available_cpu + self.used_cpu
    }

    pub fn total_ram(&self) -> f64 {
        self.available_ram + self.used_ram
    }

    /// Admission check: both resources must be strictly below what is left.
    pub fn can_fit(&self, demand: ResourceDemand) -> bool {
        demand.cpu < self.available_cpu && demand.ram < self.available_ram
    }

    pub fn reserve(&mut self, demand: ResourceDemand) {
        self.available_cpu -= demand.cpu;
        self.available_ram -= demand.ram;
        self.used_cpu += demand.cpu;
        self.used_ram += demand.ram;
    }

    pub fn release(&mut self, demand: ResourceDemand) {
        self.available_cpu += demand.cpu;
        self.available_ram += demand.ram;
        self.used_cpu -= demand.cpu;
        self.used_ram -= demand.ram;
    }
}

/// The largest host in the cluster, per resource. Group budgets are
/// expressed as a fraction of this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HostCapacity {
    pub cpu: f64,
    pub ram: f64,
}

impl HostCapacity {
    pub fn from_hosts(hosts: &[HostResources]) -> Self {
        hosts.iter().fold(Self::default(), |acc, h| Self {
            cpu: acc.cpu.max(h.total_cpu()),
            ram: acc.ram.max(h.total_ram()),
        })
    }

    pub fn scaled(&self, alpha: f64) -> ResourceDemand {
        ResourceDemand::new(self.cpu * alpha, self.ram * alpha)
    }
}

// ── Affinity ───────────────────────────────────────────────────────

/// A directed affinity between two services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffinityPair {
    pub source: ServiceId,
    pub destination: ServiceId,
    pub weight: f64,
}

/// Source → (destination → weight). Asymmetric: a pair may only carry a
/// weight in one direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AffinityMap(BTreeMap<ServiceId, BTreeMap<ServiceId, f64>>);

impl AffinityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<ServiceId>, destination: impl Into<ServiceId>, weight: f64) {
        self.0
            .entry(source.into())
            .or_default()
            .insert(destination.into(), weight);
    }

    /// Recorded weight for `source → destination`, if any.
    pub fn weight(&self, source: &str, destination: &str) -> Option<f64> {
        self.0.get(source).and_then(|d| d.get(destination)).copied()
    }

    /// Undirected weight: both directions summed, missing directions count as 0.
    pub fn pair_weight(&self, a: &str, b: &str) -> f64 {
        self.weight(a, b).unwrap_or(0.0) + self.weight(b, a).unwrap_or(0.0)
    }

    /// Iterate over every recorded `(source, destination, weight)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.0.iter().flat_map(|(src, dests)| {
            dests
                .iter()
                .map(move |(dst, w)| (src.as_str(), dst.as_str(), *w))
        })
    }

    /// Keep only entries whose endpoints both satisfy `keep`.
    pub fn restrict(&self, keep: impl Fn(&str) -> bool) -> Self {
        self.iter()
            .filter(|(s, d, _)| keep(s) && keep(d))
            .collect()
    }

    /// All pairs ordered by descending weight. Equal weights keep
    /// `(source, destination)` order.
    pub fn sorted_pairs(&self) -> Vec<AffinityPair> {
        let mut pairs: Vec<AffinityPair> = self
            .iter()
            .map(|(s, d, w)| AffinityPair {
                source: s.to_string(),
                destination: d.to_string(),
                weight: w,
            })
            .collect();
        // Stable sort preserves the map's lexicographic order on ties.
        pairs.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        pairs
    }

    pub fn total(&self) -> f64 {
        self.iter().map(|(_, _, w)| w).sum()
    }

    /// Number of recorded directed entries.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Into<ServiceId>, D: Into<ServiceId>> FromIterator<(S, D, f64)> for AffinityMap {
    fn from_iter<I: IntoIterator<Item = (S, D, f64)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (s, d, w) in iter {
            map.insert(s, d, w);
        }
        map
    }
}

// ── Partition ──────────────────────────────────────────────────────

/// Named, non-empty groups of services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition(BTreeMap<GroupId, BTreeSet<ServiceId>>);

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    /// A partition holding every service in one group (id 1).
    pub fn single<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ServiceId>,
    {
        let mut partition = Self::new();
        partition.push_group(services.into_iter().map(Into::into).collect());
        partition
    }

    /// Add a group under a fresh id. Empty groups are discarded.
    pub fn push_group(&mut self, members: BTreeSet<ServiceId>) -> Option<GroupId> {
        if members.is_empty() {
            return None;
        }
        let id = self.0.keys().next_back().map_or(1, |last| last + 1);
        self.0.insert(id, members);
        Some(id)
    }

    pub fn remove(&mut self, id: GroupId) -> Option<BTreeSet<ServiceId>> {
        self.0.remove(&id)
    }

    pub fn get(&self, id: GroupId) -> Option<&BTreeSet<ServiceId>> {
        self.0.get(&id)
    }

    /// Add `service` to an existing group. Returns false if the group is unknown.
    pub fn add_member(&mut self, id: GroupId, service: impl Into<ServiceId>) -> bool {
        match self.0.get_mut(&id) {
            Some(group) => {
                group.insert(service.into());
                true
            }
            None => false,
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &BTreeSet<ServiceId>)> {
        self.0.iter().map(|(id, g)| (*id, g))
    }

    pub fn group_of(&self, service: &str) -> Option<GroupId> {
        self.0
            .iter()
            .find(|(_, g)| g.contains(service))
            .map(|(id, _)| *id)
    }

    /// Union of all groups.
    pub fn services(&self) -> BTreeSet<ServiceId> {
        self.0.values().flatten().cloned().collect()
    }

    /// Total memberships, counting a service once per group it appears in.
    pub fn service_count(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Placement ──────────────────────────────────────────────────────

/// Host → services running on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Placement(BTreeMap<HostId, BTreeSet<ServiceId>>);

impl Placement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, host: impl Into<HostId>, service: impl Into<ServiceId>) {
        self.0.entry(host.into()).or_default().insert(service.into());
    }

    /// Make sure `host` has an entry, even if nothing runs on it.
    pub fn ensure_host(&mut self, host: impl Into<HostId>) {
        self.0.entry(host.into()).or_default();
    }

    pub fn host_of(&self, service: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, services)| services.contains(service))
            .map(|(host, _)| host.as_str())
    }

    /// Move `service` from `from` to `to`. Returns false if it was not on `from`.
    pub fn move_service(&mut self, service: &str, from: &str, to: &str) -> bool {
        let removed = self
            .0
            .get_mut(from)
            .is_some_and(|services| services.remove(service));
        if removed {
            self.assign(to, service);
        }
        removed
    }

    pub fn services_on(&self, host: &str) -> Option<&BTreeSet<ServiceId>> {
        self.0.get(host)
    }

    pub fn hosts(&self) -> impl Iterator<Item = (&str, &BTreeSet<ServiceId>)> {
        self.0.iter().map(|(h, s)| (h.as_str(), s))
    }

    /// Service → host lookup table.
    pub fn index(&self) -> HashMap<&str, &str> {
        self.0
            .iter()
            .flat_map(|(host, services)| services.iter().map(move |s| (s.as_str(), host.as_str())))
            .collect()
    }

    pub fn service_count(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    /// True when no service is placed anywhere.
    pub fn is_empty(&self) -> bool {
        self.service_count() == 0
    }
}

// ── Cluster state ──────────────────────────────────────────────────

/// Validated input for one placement run.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    pub services: Vec<ServiceId>,
    pub demands: Demands,
    pub hosts: Vec<HostResources>,
    pub placement: Placement,
    pub affinity: AffinityMap,
}

impl ClusterState {
    pub fn capacity(&self) -> HostCapacity {
        HostCapacity::from_hosts(&self.hosts)
    }

    /// Host counters with every current resident's demand handed back, as
    /// if the host were empty of the application being re-placed.
    pub fn vacated_hosts(&self) -> Vec<HostResources> {
        self.hosts
            .iter()
            .map(|host| {
                let mut vacated = host.clone();
                if let Some(residents) = self.placement.services_on(&host.host_id) {
                    let freed = ResourceDemand::of_group(residents, &self.demands);
                    vacated.available_cpu += freed.cpu;
                    vacated.available_ram += freed.ram;
                    vacated.used_cpu = (vacated.used_cpu - freed.cpu).max(0.0);
                    vacated.used_ram = (vacated.used_ram - freed.ram).max(0.0);
                }
                vacated
            })
            .collect()
    }
}
