//! Undirected affinity graph over a set of services.
//!
//! One node per service, one edge per related pair. Both directions of an
//! asymmetric affinity collapse onto the same edge with their weights summed.
//! Pairs naming a service outside the node set are treated as "no edge".

use std::collections::{BTreeMap, HashMap};

use affinity_core::{AffinityMap, ServiceId};

#[derive(Debug, Clone, Default)]
pub struct AffinityGraph {
    names: Vec<ServiceId>,
    index: HashMap<ServiceId, usize>,
    adjacency: Vec<BTreeMap<usize, f64>>,
}

impl AffinityGraph {
    /// Build the graph for `services`. Duplicate service names are ignored.
    pub fn build<'a>(
        services: impl IntoIterator<Item = &'a ServiceId>,
        affinity: &AffinityMap,
    ) -> Self {
        let mut graph = Self::default();
        for service in services {
            if graph.index.contains_key(service) {
                continue;
            }
            graph.index.insert(service.clone(), graph.names.len());
            graph.names.push(service.clone());
            graph.adjacency.push(BTreeMap::new());
        }

        for (source, dest, weight) in affinity.iter() {
            let (Some(&a), Some(&b)) = (graph.index.get(source), graph.index.get(dest)) else {
                continue;
            };
            if a == b {
                continue;
            }
            *graph.adjacency[a].entry(b).or_insert(0.0) += weight;
            *graph.adjacency[b].entry(a).or_insert(0.0) += weight;
        }
        graph
    }

    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Number of undirected edges.
    #[cfg(test)]
    pub(crate) fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeMap::len).sum::<usize>() / 2
    }

    #[cfg(test)]
    pub(crate) fn index_of(&self, service: &str) -> Option<usize> {
        self.index.get(service).copied()
    }

    pub fn name(&self, node: usize) -> &ServiceId {
        &self.names[node]
    }

    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.adjacency[node].iter().map(|(n, w)| (*n, *w))
    }

    #[cfg(test)]
    pub(crate) fn weight(&self, a: usize, b: usize) -> Option<f64> {
        self.adjacency.get(a).and_then(|adj| adj.get(&b)).copied()
    }

    /// Sum of all edge weights, each undirected edge counted once.
    pub fn total_weight(&self) -> f64 {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(a, adj)| adj.range(a + 1..).map(|(_, w)| *w))
            .sum()
    }
}
