//! Group-to-host bin-packing.
//!
//! Each group is indivisible. Candidate hosts must strictly exceed the
//! group's demand on both resources, then are ranked by:
//! - **Traffic**: affinity the group exchanges with services currently on the host
//! - **CPU load**: prefer the host most CPU-loaded after placement
//! - **RAM load**: prefer the host most RAM-loaded after placement

use std::cmp::Ordering;
use std::collections::BTreeSet;

use affinity_core::{
    AffinityMap, Demands, HostId, HostResources, Partition, Placement, ResourceDemand, ServiceId,
};
use tracing::{debug, warn};

/// Scored candidate host for a single group.
#[derive(Debug, Clone, PartialEq)]
pub struct HostScore {
    pub host_id: HostId,
    /// Cross-host traffic that would be avoided by landing here.
    pub traffic: f64,
    pub projected_cpu: f64,
    pub projected_ram: f64,
}

impl HostScore {
    /// Ordering by traffic, then CPU load, then RAM load. Higher is better.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.traffic
            .total_cmp(&other.traffic)
            .then(self.projected_cpu.total_cmp(&other.projected_cpu))
            .then(self.projected_ram.total_cmp(&other.projected_ram))
    }
}

/// Score one host for a group. `None` when the host cannot take it.
pub fn score_host(
    host: &HostResources,
    group: &BTreeSet<ServiceId>,
    demand: ResourceDemand,
    residents: Option<&BTreeSet<ServiceId>>,
    affinity: &AffinityMap,
) -> Option<HostScore> {
    if !host.can_fit(demand) {
        return None;
    }

    let traffic = residents
        .map(|residents| {
            residents
                .iter()
                .filter(|r| !group.contains(*r))
                .flat_map(|r| group.iter().map(move |s| affinity.pair_weight(s, r)))
                .sum::<f64>()
        })
        .unwrap_or(0.0);

    Some(HostScore {
        host_id: host.host_id.clone(),
        traffic,
        projected_cpu: host.used_cpu + demand.cpu,
        projected_ram: host.used_ram + demand.ram,
    })
}

pub struct BinPacker<'a> {
    demands: &'a Demands,
    affinity: &'a AffinityMap,
}

impl<'a> BinPacker<'a> {
    pub fn new(demands: &'a Demands, affinity: &'a AffinityMap) -> Self {
        Self { demands, affinity }
    }

    /// Assign every group of `groups` to a host, in group order.
    ///
    /// `hosts` is copied before any counter is touched. `current` supplies
    /// the residents used for traffic scoring. Returns `None` as soon as one
    /// group fits nowhere; the result otherwise names only the hosts that
    /// received a group.
    pub fn pack(
        &self,
        groups: &Partition,
        current: &Placement,
        hosts: &[HostResources],
    ) -> Option<Placement> {
        let mut hosts = hosts.to_vec();
        let mut placement = Placement::new();

        for (group_id, group) in groups.groups() {
            let demand = ResourceDemand::of_group(group, self.demands);

            let mut best: Option<(usize, HostScore)> = None;
            for (i, host) in hosts.iter().enumerate() {
                let residents = current.services_on(&host.host_id);
                let Some(score) = score_host(host, group, demand, residents, self.affinity) else {
                    continue;
                };
                if best
                    .as_ref()
                    .is_none_or(|(_, b)| score.rank_cmp(b) == Ordering::Greater)
                {
                    best = Some((i, score));
                }
            }

            let Some((index, score)) = best else {
                warn!(
                    group = group_id,
                    cpu = demand.cpu,
                    ram = demand.ram,
                    "no host can take group"
                );
                return None;
            };

            let host = &mut hosts[index];
            host.reserve(demand);
            for service in group {
                placement.assign(host.host_id.clone(), service.clone());
            }
            debug!(
                group = group_id,
                host = %score.host_id,
                traffic = score.traffic,
                available_cpu = host.available_cpu,
                available_ram = host.available_ram,
                "packed group"
            );
        }

        Some(placement)
    }
}
