//! Placement outcome and traffic accounting.

use affinity_core::config::Strategy;
use affinity_core::{AffinityMap, Placement};
use serde::Serialize;

/// What one orchestrator run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PlacementReport {
    pub strategy: Strategy,
    pub placement: Placement,
    /// Budget fraction of the successful attempt, for partition strategies.
    pub alpha: Option<f64>,
    /// Group count of the successful attempt, for split-based strategies.
    pub k: Option<usize>,
    /// Attempts made, including the successful one.
    pub attempts: usize,
    pub traffic_before: f64,
    pub traffic_after: f64,
}

impl PlacementReport {
    /// Cross-host traffic removed by the new placement. Negative when it got worse.
    pub fn traffic_saved(&self) -> f64 {
        self.traffic_before - self.traffic_after
    }
}

/// Sum of directed affinity between services on different hosts.
///
/// Pairs with an endpoint missing from `placement` do not count.
pub fn cross_host_traffic(placement: &Placement, affinity: &AffinityMap) -> f64 {
    let index = placement.index();
    affinity
        .iter()
        .filter_map(|(src, dst, weight)| {
            let (a, b) = (index.get(src)?, index.get(dst)?);
            (a != b).then_some(weight)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_split_pairs() {
        let affinity: AffinityMap = [
            ("a", "b", 4.0),
            ("b", "a", 1.0),
            ("a", "c", 2.0),
            ("c", "z", 9.0),
        ]
        .into_iter()
        .collect();
        let mut placement = Placement::new();
        placement.assign("h1", "a");
        placement.assign("h2", "b");
        placement.assign("h1", "c");

        assert_eq!(cross_host_traffic(&placement, &affinity), 5.0);
    }

    #[test]
    fn empty_placement_has_no_traffic() {
        let affinity: AffinityMap = [("a", "b", 4.0)].into_iter().collect();
        assert_eq!(cross_host_traffic(&Placement::new(), &affinity), 0.0);
    }

    #[test]
    fn report_serializes_strategy_in_kebab_case() {
        let report = PlacementReport {
            strategy: Strategy::KPartition,
            placement: Placement::new(),
            alpha: Some(0.5),
            k: Some(3),
            attempts: 2,
            traffic_before: 10.0,
            traffic_after: 4.0,
        };
        assert_eq!(report.traffic_saved(), 6.0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["strategy"], "k-partition");
        assert_eq!(json["attempts"], 2);
    }
}
