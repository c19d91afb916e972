//! End-to-end placement scenarios.
//!
//! Drives the engines through the public API, from a collector snapshot
//! down to the final report.

use std::collections::BTreeSet;

use affinity_core::config::{AffinityMetric, CentroidPolicy, Strategy};
use affinity_core::*;
use affinity_placement::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;

const SNAPSHOT: &str = r#"{
    "demands": {
        "frontend-7d9f-x2k4p": { "cpu": "0.100", "ram": 64 },
        "cartservice-5c8d-abcde": { "cpu": 0.2, "ram": "128" },
        "redis-cart-6b7c-qwert": { "cpu": 0.05, "ram": 32 }
    },
    "hosts": {
        "node-1": { "available_cpu": 1.5, "available_ram": "1000", "used_cpu": 0.5, "used_ram": 200 },
        "node-2": { "available_cpu": "2", "available_ram": 800, "used_cpu": 0, "used_ram": "0" }
    },
    "placement": {
        "node-1": ["frontend-7d9f-x2k4p", "cartservice-5c8d-abcde"],
        "node-2": ["redis-cart-6b7c-qwert"]
    },
    "affinity": {
        "frontend": { "cartservice": "12.5" },
        "cartservice": { "redis-cart": 4 }
    }
}"#;

fn snapshot_state() -> ClusterState {
    ClusterSnapshot::from_json_str(SNAPSHOT)
        .unwrap()
        .into_state(AffinityMetric::RequestRate, &ReplicaSuffixNormalizer)
        .unwrap()
}

fn names(list: &[&str]) -> Vec<ServiceId> {
    list.iter().map(|s| s.to_string()).collect()
}

fn set(list: &[&str]) -> BTreeSet<ServiceId> {
    list.iter().map(|s| s.to_string()).collect()
}

fn unit_demands(services: &[&str]) -> Demands {
    services
        .iter()
        .map(|s| (s.to_string(), ResourceDemand::new(1.0, 1.0)))
        .collect()
}

#[test]
fn clustering_keeps_heaviest_pairs_together() {
    let affinity: AffinityMap = [("A", "B", 10.0), ("C", "D", 1.0)].into_iter().collect();
    let engine = ClusterEngine::new(&affinity, CentroidPolicy::MinAffinity);
    let mut rng = StdRng::seed_from_u64(3);

    let partition = engine
        .cluster(&names(&["A", "B", "C", "D"]), 2, &mut rng)
        .unwrap();

    let groups: Vec<_> = partition.groups().map(|(_, g)| g.clone()).collect();
    assert_eq!(groups.len(), 2);
    assert!(groups.contains(&set(&["A", "B"])));
    assert!(groups.contains(&set(&["C", "D"])));
}

#[test]
fn packing_chooses_roomy_host_and_fails_closed() {
    let mut demands = Demands::new();
    demands.insert("svc".to_string(), ResourceDemand::new(3.0, 1.0));
    let affinity = AffinityMap::new();
    let packer = BinPacker::new(&demands, &affinity);
    let groups = Partition::single(["svc"]);

    let hosts = vec![
        HostResources::new("H1", 2.0, 10.0, 0.0, 0.0),
        HostResources::new("H2", 4.0, 10.0, 0.0, 0.0),
    ];
    let placement = packer.pack(&groups, &Placement::new(), &hosts).unwrap();
    assert_eq!(placement.host_of("svc"), Some("H2"));

    let crowded = vec![
        HostResources::new("H1", 2.0, 10.0, 0.0, 0.0),
        HostResources::new("H2", 2.0, 10.0, 0.0, 0.0),
    ];
    assert!(packer.pack(&groups, &Placement::new(), &crowded).is_none());
}

#[test]
fn migration_is_single_pass() {
    let mut demands = unit_demands(&["A", "B"]);
    demands.insert("C".to_string(), ResourceDemand::new(2.0, 1.0));
    demands.insert("D".to_string(), ResourceDemand::new(2.0, 1.0));

    let mut placement = Placement::new();
    placement.assign("H1", "A");
    placement.assign("H1", "C");
    placement.assign("H2", "B");
    placement.assign("H2", "D");

    // Only H2 has room for a unit move, and A leaving H1 is not enough for D.
    let hosts = vec![
        HostResources::new("H1", 0.5, 10.0, 3.0, 2.0),
        HostResources::new("H2", 1.5, 10.0, 3.0, 2.0),
    ];
    let pairs: Vec<AffinityPair> = [("A", "B", 10.0), ("C", "D", 1.0)]
        .into_iter()
        .collect::<AffinityMap>()
        .sorted_pairs();

    let result = MigrationHeuristic::new(&demands).migrate(&placement, &hosts, &pairs);
    assert_eq!(result.host_of("A"), result.host_of("B"));
    assert_ne!(result.host_of("C"), result.host_of("D"));
}

#[test]
fn partition_then_pack_from_snapshot() {
    let state = snapshot_state();
    let config = PlacementConfig {
        strategy: Strategy::BinaryPartition,
        seed: Some(11),
        ..PlacementConfig::default()
    };

    let report = PlacementOrchestrator::new(config).run(&state).unwrap();

    assert_eq!(report.placement.service_count(), 3);
    assert_eq!(report.traffic_before, 4.0);
    assert!(report.traffic_after <= report.traffic_before);
    assert_eq!(report.alpha, Some(1.0));
}

#[test]
fn bisecting_with_companion_from_snapshot() {
    let state = snapshot_state();
    let mut config = PlacementConfig {
        strategy: Strategy::Bisecting,
        seed: Some(5),
        ..PlacementConfig::default()
    };
    config.clustering.k = 2;
    config
        .companions
        .insert("cartservice".to_string(), vec!["redis-cart".to_string()]);

    let report = PlacementOrchestrator::new(config).run(&state).unwrap();

    let cart = report.placement.host_of("cartservice");
    assert!(cart.is_some());
    assert_eq!(cart, report.placement.host_of("redis-cart"));
    assert_eq!(report.placement.host_of("frontend"), cart);
    assert_eq!(report.traffic_after, 0.0);
    assert_eq!(report.k, Some(2));
}

#[test]
fn migration_strategy_from_snapshot() {
    let state = snapshot_state();
    let config = PlacementConfig {
        strategy: Strategy::Migration,
        ..PlacementConfig::default()
    };

    let report = PlacementOrchestrator::new(config).run(&state).unwrap();

    // frontend settles cartservice on node-1 first, so the weaker
    // cartservice-redis-cart pair is left split.
    assert_eq!(report.placement.host_of("cartservice"), Some("node-1"));
    assert_eq!(report.placement.host_of("redis-cart"), Some("node-2"));
    assert_eq!(report.traffic_saved(), 0.0);
    assert_eq!(report.attempts, 1);
}

#[test]
fn message_size_metric_requires_data() {
    let err = ClusterSnapshot::from_json_str(SNAPSHOT)
        .unwrap()
        .into_state(AffinityMetric::MessageSize, &ReplicaSuffixNormalizer)
        .unwrap_err();
    assert!(matches!(err, InputError::MissingMetric(_)));

    let err: PlacementError = err.into();
    assert!(err.to_string().contains("message-size"));
}

#[tokio::test]
async fn cancelled_run_on_blocking_pool() {
    let state = snapshot_state();
    let (tx, rx) = watch::channel(false);
    let orchestrator = PlacementOrchestrator::new(PlacementConfig::default()).with_cancel(rx);

    tx.send(true).unwrap();
    let result = tokio::task::spawn_blocking(move || orchestrator.run(&state))
        .await
        .unwrap();

    assert!(matches!(result, Err(PlacementError::Cancelled)));
}
