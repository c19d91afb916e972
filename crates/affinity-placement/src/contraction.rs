//! Randomized weighted edge contraction.
//!
//! A single contraction run repeatedly picks a random live edge and merges
//! its endpoints into one supernode. Parallel edges created by a merge are
//! summed rather than kept side by side, so the weight left between the
//! surviving supernodes is exactly the affinity that would cross group
//! boundaries. Many runs are made and the one with the smallest crossing
//! weight wins.
//!
//! [`PartitionEngine::calculate_app_partitions`] drives the contraction
//! recursively: any group whose resource sum does not fit within
//! `alpha * capacity` is split again until nothing changes.

use std::collections::{BTreeMap, BTreeSet};

use affinity_core::config::PartitionConfig;
use affinity_core::{AffinityMap, Demands, HostCapacity, Partition, ResourceDemand, ServiceId};
use rand::Rng;
use tracing::{debug, trace};

use crate::error::{PlacementError, PlacementResult};
use crate::graph::AffinityGraph;

/// Limits applied to one partitioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractionSettings {
    /// Upper bound on contraction runs per split. Each split makes
    /// `min(group size, max_trials)` runs.
    pub max_trials: usize,
    /// Upper bound on scans of the recursive splitter.
    pub max_iterations: usize,
    /// Upper bound on rejected edge samples within one contraction step.
    pub max_sample_attempts: usize,
}

impl Default for ContractionSettings {
    fn default() -> Self {
        Self::from(&PartitionConfig::default())
    }
}

impl From<&PartitionConfig> for ContractionSettings {
    fn from(config: &PartitionConfig) -> Self {
        Self {
            max_trials: config.max_trials,
            max_iterations: config.max_iterations,
            max_sample_attempts: config.max_sample_attempts,
        }
    }
}

// ── Contraction arena ──────────────────────────────────────────────

/// Working copy of an [`AffinityGraph`] owned by one contraction run.
///
/// Nodes are arena indices. A merged node stays in the arena with
/// `alive == false`; its services live on in the absorbing node's `members`.
#[derive(Debug, Clone)]
pub(crate) struct ContractionGraph {
    adjacency: Vec<BTreeMap<usize, f64>>,
    members: Vec<Vec<usize>>,
    alive: Vec<bool>,
    live_nodes: usize,
    live_edges: usize,
    absorbed_weight: f64,
}

impl ContractionGraph {
    /// Copy `graph`, keeping only edges with non-zero weight.
    pub(crate) fn from_graph(graph: &AffinityGraph) -> Self {
        let n = graph.node_count();
        let adjacency: Vec<BTreeMap<usize, f64>> = (0..n)
            .map(|node| graph.neighbors(node).filter(|(_, w)| *w != 0.0).collect())
            .collect();
        let live_edges = adjacency.iter().map(BTreeMap::len).sum::<usize>() / 2;
        Self {
            adjacency,
            members: (0..n).map(|node| vec![node]).collect(),
            alive: vec![true; n],
            live_nodes: n,
            live_edges,
            absorbed_weight: 0.0,
        }
    }

    pub(crate) fn live_nodes(&self) -> usize {
        self.live_nodes
    }

    pub(crate) fn live_edges(&self) -> usize {
        self.live_edges
    }

    /// Weight still running between distinct supernodes.
    pub(crate) fn live_weight(&self) -> f64 {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(a, adj)| adj.range(a + 1..).map(|(_, w)| *w))
            .sum()
    }

    /// Weight that ended up inside a supernode.
    pub(crate) fn absorbed_weight(&self) -> f64 {
        self.absorbed_weight
    }

    /// Pick a live edge: a uniformly random node with neighbors, then a
    /// uniformly random neighbor. Zero-weight picks are rejected and resampled.
    pub(crate) fn sample_edge<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        max_attempts: usize,
    ) -> PlacementResult<(usize, usize)> {
        let sources: Vec<usize> = (0..self.adjacency.len())
            .filter(|&n| self.alive[n] && !self.adjacency[n].is_empty())
            .collect();
        if sources.is_empty() {
            return Err(PlacementError::SamplingExhausted { attempts: 0 });
        }

        for _ in 0..max_attempts {
            let source = sources[rng.gen_range(0..sources.len())];
            let neighbors = &self.adjacency[source];
            let Some((&dest, &weight)) = neighbors.iter().nth(rng.gen_range(0..neighbors.len()))
            else {
                continue;
            };
            if weight == 0.0 {
                continue;
            }
            return Ok((source, dest));
        }
        Err(PlacementError::SamplingExhausted {
            attempts: max_attempts,
        })
    }

    /// Merge `dest` into `source`.
    ///
    /// Every edge of `dest` is moved onto `source`; where `source` already
    /// has an edge to the same neighbor the two weights are summed. The
    /// `source`–`dest` edge itself, if any, becomes absorbed weight.
    pub(crate) fn contract(&mut self, source: usize, dest: usize) {
        debug_assert!(source != dest && self.alive[source] && self.alive[dest]);

        if let Some(weight) = self.adjacency[source].remove(&dest) {
            self.adjacency[dest].remove(&source);
            self.absorbed_weight += weight;
            self.live_edges -= 1;
        }

        let moved = std::mem::take(&mut self.adjacency[dest]);
        for (neighbor, weight) in moved {
            self.adjacency[neighbor].remove(&dest);
            match self.adjacency[source].get_mut(&neighbor) {
                Some(existing) => {
                    *existing += weight;
                    *self.adjacency[neighbor].entry(source).or_insert(0.0) += weight;
                    // Two edges collapsed into one.
                    self.live_edges -= 1;
                }
                None => {
                    self.adjacency[source].insert(neighbor, weight);
                    self.adjacency[neighbor].insert(source, weight);
                }
            }
        }

        let absorbed = std::mem::take(&mut self.members[dest]);
        self.members[source].extend(absorbed);
        self.alive[dest] = false;
        self.live_nodes -= 1;
    }

    /// The heaviest edge still running between two live supernodes.
    /// Ties go to the lowest index pair.
    pub(crate) fn heaviest_edge(&self) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (a, adj) in self.adjacency.iter().enumerate() {
            for (&b, &weight) in adj.range(a + 1..) {
                if best.is_none_or(|(_, _, w)| weight > w) {
                    best = Some((a, b, weight));
                }
            }
        }
        best.map(|(a, b, _)| (a, b))
    }

    /// Merge the two live supernodes with the fewest members.
    pub(crate) fn merge_smallest(&mut self) {
        let mut live: Vec<usize> = (0..self.alive.len()).filter(|&n| self.alive[n]).collect();
        if live.len() < 2 {
            return;
        }
        live.sort_by_key(|&n| (self.members[n].len(), n));
        self.contract(live[0], live[1]);
    }

    /// Member lists of the surviving supernodes.
    pub(crate) fn groups(&self) -> Vec<Vec<usize>> {
        (0..self.alive.len())
            .filter(|&n| self.alive[n])
            .map(|n| self.members[n].clone())
            .collect()
    }
}

/// Outcome of one contraction run.
#[derive(Debug, Clone, PartialEq)]
pub struct Contraction {
    pub groups: Vec<BTreeSet<ServiceId>>,
    /// Affinity left between the groups.
    pub cut_weight: f64,
}

/// Contract `graph` down to at most `k` supernodes.
///
/// Random contraction continues while more than `k` supernodes and more than
/// `k - 1` live edges remain. Past that point the remaining edges are
/// contracted heaviest-first, and only supernodes with no edge between them
/// are merged smallest-first, which costs nothing in cut weight.
pub fn contract_once<R: Rng + ?Sized>(
    graph: &AffinityGraph,
    k: usize,
    rng: &mut R,
    max_sample_attempts: usize,
) -> PlacementResult<Contraction> {
    let k = k.max(1);
    let mut arena = ContractionGraph::from_graph(graph);

    while arena.live_nodes() > k && arena.live_edges() > k - 1 {
        let (source, dest) = arena.sample_edge(rng, max_sample_attempts)?;
        trace!(
            source = %graph.name(source),
            dest = %graph.name(dest),
            "contracting edge"
        );
        arena.contract(source, dest);
    }
    while arena.live_nodes() > k {
        match arena.heaviest_edge() {
            Some((source, dest)) => arena.contract(source, dest),
            None => arena.merge_smallest(),
        }
    }

    let groups = arena
        .groups()
        .into_iter()
        .map(|members| members.into_iter().map(|n| graph.name(n).clone()).collect())
        .collect();

    Ok(Contraction {
        groups,
        cut_weight: arena.live_weight(),
    })
}

// ── Partition engine ───────────────────────────────────────────────

/// Resource-bounded affinity partitioning by repeated contraction.
pub struct PartitionEngine<'a> {
    affinity: &'a AffinityMap,
    demands: &'a Demands,
    settings: ContractionSettings,
}

impl<'a> PartitionEngine<'a> {
    pub fn new(affinity: &'a AffinityMap, demands: &'a Demands) -> Self {
        Self {
            affinity,
            demands,
            settings: ContractionSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ContractionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Split `services` into at most `k` groups, approximately minimizing
    /// the affinity that crosses between them.
    ///
    /// Runs one contraction per service (capped by `max_trials`) and keeps
    /// the first run with the smallest cut.
    pub fn split<R: Rng + ?Sized>(
        &self,
        services: &BTreeSet<ServiceId>,
        k: usize,
        rng: &mut R,
    ) -> PlacementResult<Vec<BTreeSet<ServiceId>>> {
        if services.len() <= 1 {
            return Ok(vec![services.clone()]);
        }

        let graph = AffinityGraph::build(services, self.affinity);
        let trials = services.len().min(self.settings.max_trials).max(1);

        let mut best: Option<Contraction> = None;
        for trial in 0..trials {
            let run = contract_once(&graph, k, rng, self.settings.max_sample_attempts)?;
            trace!(trial, cut = run.cut_weight, groups = run.groups.len(), "contraction trial");
            if best.as_ref().is_none_or(|b| run.cut_weight < b.cut_weight) {
                best = Some(run);
            }
        }

        let best = best.map(|b| b.groups).unwrap_or_default();
        Ok(best.into_iter().filter(|g| !g.is_empty()).collect())
    }

    /// Recursively split `services` until every group of two or more services
    /// fits strictly within `alpha * capacity` on both CPU and RAM.
    pub fn calculate_app_partitions<R: Rng + ?Sized>(
        &self,
        services: &[ServiceId],
        capacity: HostCapacity,
        alpha: f64,
        k: usize,
        rng: &mut R,
    ) -> PlacementResult<Partition> {
        let mut current = Partition::single(services.iter().cloned());
        let budget = capacity.scaled(alpha);

        for iteration in 0..self.settings.max_iterations {
            let previous = current.clone();

            for (id, group) in previous.groups() {
                if group.len() <= 1 {
                    continue;
                }
                let demand = ResourceDemand::of_group(group, self.demands);
                if demand.cpu < budget.cpu && demand.ram < budget.ram {
                    continue;
                }

                let parts = self.split(group, k, rng)?;
                debug!(
                    group = id,
                    size = group.len(),
                    cpu = demand.cpu,
                    ram = demand.ram,
                    parts = parts.len(),
                    "split group over budget"
                );
                current.remove(id);
                for part in parts {
                    current.push_group(part);
                }
            }

            if current == previous {
                debug!(
                    alpha,
                    k,
                    groups = current.len(),
                    iterations = iteration + 1,
                    "partition reached fixed point"
                );
                return Ok(current);
            }
        }

        Err(PlacementError::NoConvergence {
            iterations: self.settings.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn names(list: &[&str]) -> Vec<ServiceId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn set(list: &[&str]) -> BTreeSet<ServiceId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Two tight triangles joined by one weak bridge.
    fn barbell() -> (Vec<ServiceId>, AffinityMap) {
        let affinity: AffinityMap = [
            ("a", "b", 10.0),
            ("b", "c", 10.0),
            ("c", "a", 10.0),
            ("d", "e", 10.0),
            ("e", "f", 10.0),
            ("f", "d", 10.0),
            ("c", "d", 0.5),
        ]
        .into_iter()
        .collect();
        (names(&["a", "b", "c", "d", "e", "f"]), affinity)
    }

    fn unit_demands(services: &[ServiceId]) -> Demands {
        services
            .iter()
            .map(|s| (s.clone(), ResourceDemand::new(1.0, 1.0)))
            .collect()
    }

    #[test]
    fn contraction_conserves_weight() {
        let (services, affinity) = barbell();
        let graph = AffinityGraph::build(&services, &affinity);
        let total = graph.total_weight();
        let mut arena = ContractionGraph::from_graph(&graph);
        let mut rng = StdRng::seed_from_u64(3);

        while arena.live_edges() > 0 {
            let (s, d) = arena.sample_edge(&mut rng, 100).unwrap();
            arena.contract(s, d);
            let accounted = arena.live_weight() + arena.absorbed_weight();
            assert!((accounted - total).abs() < 1e-9, "{accounted} != {total}");
        }
        assert_eq!(arena.live_nodes(), 1);
        assert!((arena.absorbed_weight() - total).abs() < 1e-9);
    }

    #[test]
    fn parallel_edges_accumulate() {
        // a-c and b-c both become edges of the merged {a, b}.
        let affinity: AffinityMap = [("a", "b", 1.0), ("a", "c", 2.0), ("c", "b", 3.0)]
            .into_iter()
            .collect();
        let graph = AffinityGraph::build(&names(&["a", "b", "c"]), &affinity);
        let mut arena = ContractionGraph::from_graph(&graph);
        assert_eq!(arena.live_edges(), 3);

        arena.contract(0, 1);
        assert_eq!(arena.live_nodes(), 2);
        assert_eq!(arena.live_edges(), 1);
        assert_eq!(arena.live_weight(), 5.0);
        assert_eq!(arena.absorbed_weight(), 1.0);
        assert_eq!(arena.groups(), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn zero_weight_edges_are_not_sampled() {
        let affinity: AffinityMap = [("a", "b", 0.0)].into_iter().collect();
        let graph = AffinityGraph::build(&names(&["a", "b"]), &affinity);
        let arena = ContractionGraph::from_graph(&graph);
        assert_eq!(arena.live_edges(), 0);

        let mut rng = StdRng::seed_from_u64(1);
        let err = arena.sample_edge(&mut rng, 10).unwrap_err();
        assert!(matches!(err, PlacementError::SamplingExhausted { .. }));
    }

    #[test]
    fn binary_split_separates_unrelated_clusters() {
        let affinity: AffinityMap = [
            ("a", "b", 10.0),
            ("b", "c", 10.0),
            ("c", "a", 10.0),
            ("d", "e", 10.0),
            ("e", "f", 10.0),
            ("f", "d", 10.0),
        ]
        .into_iter()
        .collect();
        let services = names(&["a", "b", "c", "d", "e", "f"]);
        let demands = unit_demands(&services);
        let engine = PartitionEngine::new(&affinity, &demands);
        let mut rng = StdRng::seed_from_u64(11);

        let mut parts = engine.split(&services.iter().cloned().collect(), 2, &mut rng).unwrap();
        parts.sort();
        assert_eq!(parts, vec![set(&["a", "b", "c"]), set(&["d", "e", "f"])]);
    }

    #[test]
    fn repeated_trials_find_the_weak_bridge() {
        let (services, affinity) = barbell();
        let graph = AffinityGraph::build(&services, &affinity);
        let mut rng = StdRng::seed_from_u64(11);

        let best = (0..200)
            .map(|_| contract_once(&graph, 2, &mut rng, 100).unwrap())
            .min_by(|a, b| a.cut_weight.total_cmp(&b.cut_weight))
            .unwrap();
        assert_eq!(best.cut_weight, 0.5);
        let mut groups = best.groups;
        groups.sort();
        assert_eq!(groups, vec![set(&["a", "b", "c"]), set(&["d", "e", "f"])]);
    }

    #[test]
    fn disconnected_services_still_yield_k_groups() {
        let affinity: AffinityMap = [("a", "b", 4.0)].into_iter().collect();
        let graph = AffinityGraph::build(&names(&["a", "b", "c", "d"]), &affinity);
        let mut rng = StdRng::seed_from_u64(5);

        let run = contract_once(&graph, 2, &mut rng, 100).unwrap();
        assert_eq!(run.groups.len(), 2);
        assert_eq!(run.cut_weight, 0.0);
        let all: BTreeSet<ServiceId> = run.groups.iter().flatten().cloned().collect();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn isolated_service_is_split_off_for_free() {
        // Triangle plus a service with no affinity to it.
        let affinity: AffinityMap = [("a", "b", 5.0), ("b", "c", 5.0), ("c", "a", 5.0)]
            .into_iter()
            .collect();
        let graph = AffinityGraph::build(&names(&["a", "b", "c", "e"]), &affinity);

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let run = contract_once(&graph, 2, &mut rng, 100).unwrap();
            assert_eq!(run.cut_weight, 0.0, "seed {seed}");
            let mut groups = run.groups;
            groups.sort();
            assert_eq!(groups, vec![set(&["a", "b", "c"]), set(&["e"])]);
        }
    }

    #[test]
    fn leftover_edges_contract_heaviest_first() {
        let affinity: AffinityMap = [("a", "b", 1.0), ("b", "c", 7.0)].into_iter().collect();
        let graph = AffinityGraph::build(&names(&["a", "b", "c"]), &affinity);
        let arena = ContractionGraph::from_graph(&graph);
        assert_eq!(arena.heaviest_edge(), Some((1, 2)));

        let isolated = AffinityGraph::build(&names(&["a", "b"]), &AffinityMap::new());
        assert_eq!(ContractionGraph::from_graph(&isolated).heaviest_edge(), None);
    }

    #[test]
    fn k_way_split_with_fewer_services_than_k() {
        let graph = AffinityGraph::build(&names(&["a", "b"]), &AffinityMap::new());
        let mut rng = StdRng::seed_from_u64(5);
        let run = contract_once(&graph, 3, &mut rng, 100).unwrap();
        assert_eq!(run.groups.len(), 2);
    }

    #[test]
    fn fitting_partition_is_left_alone() {
        let (services, affinity) = barbell();
        let demands = unit_demands(&services);
        let engine = PartitionEngine::new(&affinity, &demands);
        let capacity = HostCapacity { cpu: 100.0, ram: 100.0 };
        let mut rng = StdRng::seed_from_u64(2);

        let partition = engine
            .calculate_app_partitions(&services, capacity, 1.0, 2, &mut rng)
            .unwrap();
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.service_count(), 6);
    }

    #[test]
    fn recursive_split_respects_budget() {
        let (services, affinity) = barbell();
        let demands = unit_demands(&services);
        let engine = PartitionEngine::new(&affinity, &demands);
        // Budget 3.5 per group: the two triangles (3 each) fit, the whole doesn't.
        let capacity = HostCapacity { cpu: 7.0, ram: 7.0 };
        let mut rng = StdRng::seed_from_u64(9);

        let partition = engine
            .calculate_app_partitions(&services, capacity, 0.5, 2, &mut rng)
            .unwrap();
        for (_, group) in partition.groups() {
            let demand = ResourceDemand::of_group(group, &demands);
            assert!(group.len() == 1 || demand.cpu < 3.5);
        }
        assert_eq!(partition.services(), services.iter().cloned().collect());
        assert_eq!(partition.service_count(), services.len());
    }

    #[test]
    fn zero_alpha_yields_singletons() {
        let (services, affinity) = barbell();
        let demands = unit_demands(&services);
        let engine = PartitionEngine::new(&affinity, &demands);
        let capacity = HostCapacity { cpu: 10.0, ram: 10.0 };
        let mut rng = StdRng::seed_from_u64(4);

        let partition = engine
            .calculate_app_partitions(&services, capacity, 0.0, 3, &mut rng)
            .unwrap();
        assert_eq!(partition.len(), services.len());
    }

    #[test]
    fn empty_service_list_is_empty_partition() {
        let affinity = AffinityMap::new();
        let demands = Demands::new();
        let engine = PartitionEngine::new(&affinity, &demands);
        let mut rng = StdRng::seed_from_u64(4);
        let partition = engine
            .calculate_app_partitions(&[], HostCapacity::default(), 1.0, 2, &mut rng)
            .unwrap();
        assert!(partition.is_empty());
    }

    #[test]
    fn iteration_guard_reports_no_convergence() {
        let (services, affinity) = barbell();
        let demands = unit_demands(&services);
        let settings = ContractionSettings {
            max_iterations: 1,
            ..ContractionSettings::default()
        };
        let engine = PartitionEngine::new(&affinity, &demands).with_settings(settings);
        let mut rng = StdRng::seed_from_u64(4);

        let err = engine
            .calculate_app_partitions(&services, HostCapacity::default(), 0.0, 2, &mut rng)
            .unwrap_err();
        assert!(matches!(err, PlacementError::NoConvergence { iterations: 1 }));
    }
}
