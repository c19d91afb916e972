//! Placement orchestrator — drives one placement run end to end.
//!
//! Given a validated [`ClusterState`] and a [`PlacementConfig`], the
//! orchestrator:
//! 1. Folds companion services into their anchors
//! 2. Groups services with the configured strategy
//! 3. Packs the groups onto vacated host counters, relaxing the budget
//!    (partition strategies) or refining the grouping (bisecting) until a
//!    packing succeeds
//!
//! The migration strategy skips grouping and refines the current placement.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use affinity_core::config::Strategy;
use affinity_core::{
    AffinityMap, ClusterState, Demands, Partition, Placement, PlacementConfig, ServiceId,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bisect::ClusterEngine;
use crate::contraction::{ContractionSettings, PartitionEngine};
use crate::error::{PlacementError, PlacementResult};
use crate::migration::MigrationHeuristic;
use crate::packer::BinPacker;
use crate::report::{PlacementReport, cross_host_traffic};

/// Grouping input with companion services folded into their anchors.
#[derive(Debug, Clone)]
struct GroupingInput {
    services: Vec<ServiceId>,
    demands: Demands,
    affinity: AffinityMap,
    /// Anchor → companions to append after grouping.
    companions: BTreeMap<ServiceId, Vec<ServiceId>>,
}

impl GroupingInput {
    fn build(state: &ClusterState, config: &PlacementConfig) -> Self {
        let known: BTreeSet<&str> = state.services.iter().map(String::as_str).collect();

        // Companion → anchor, for pairs where both sides are known services.
        let mut anchor_of: BTreeMap<ServiceId, ServiceId> = BTreeMap::new();
        for (anchor, companions) in &config.companions {
            for companion in companions {
                if !known.contains(companion.as_str()) || companion == anchor {
                    continue;
                }
                if config.companions.contains_key(companion) {
                    warn!(
                        %anchor,
                        %companion,
                        "companion is itself an anchor, placing it on its own"
                    );
                    continue;
                }
                if !known.contains(anchor.as_str()) {
                    warn!(
                        %anchor,
                        %companion,
                        "companion anchor is not a known service, placing it on its own"
                    );
                    continue;
                }
                anchor_of.entry(companion.clone()).or_insert_with(|| anchor.clone());
            }
        }

        let services: Vec<ServiceId> = state
            .services
            .iter()
            .filter(|s| !anchor_of.contains_key(*s))
            .cloned()
            .collect();

        let mut demands = state.demands.clone();
        let mut companions: BTreeMap<ServiceId, Vec<ServiceId>> = BTreeMap::new();
        for (companion, anchor) in &anchor_of {
            let extra = state.demands.get(companion).copied().unwrap_or_default();
            *demands.entry(anchor.clone()).or_default() += extra;
            companions.entry(anchor.clone()).or_default().push(companion.clone());
        }

        let fold = |s: &str| anchor_of.get(s).map(String::as_str).unwrap_or(s).to_string();
        let mut affinity = AffinityMap::new();
        for (src, dst, weight) in state.affinity.iter() {
            let (src, dst) = (fold(src), fold(dst));
            if src != dst {
                let folded = affinity.weight(&src, &dst).unwrap_or(0.0) + weight;
                affinity.insert(src, dst, folded);
            }
        }

        if !companions.is_empty() {
            debug!(
                anchors = companions.len(),
                companions = anchor_of.len(),
                "folded companion services"
            );
        }

        Self {
            services,
            demands,
            affinity,
            companions,
        }
    }

    /// Append every companion to the group holding its anchor.
    fn attach_companions(&self, mut partition: Partition) -> Partition {
        for (anchor, companions) in &self.companions {
            if let Some(id) = partition.group_of(anchor) {
                for companion in companions {
                    partition.add_member(id, companion.clone());
                }
            }
        }
        partition
    }
}

pub struct PlacementOrchestrator {
    config: PlacementConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl PlacementOrchestrator {
    pub fn new(config: PlacementConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Abort the run at the next attempt boundary once `cancel` reads `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Run with an RNG seeded from the configuration, or from entropy.
    pub fn run(&self, state: &ClusterState) -> PlacementResult<PlacementReport> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.run_with_rng(state, &mut rng)
    }

    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        state: &ClusterState,
        rng: &mut R,
    ) -> PlacementResult<PlacementReport> {
        let started = Instant::now();
        let strategy = self.config.strategy;
        let traffic_before = cross_host_traffic(&state.placement, &state.affinity);

        info!(
            %strategy,
            services = state.services.len(),
            hosts = state.hosts.len(),
            traffic_before,
            "starting placement"
        );

        let outcome = match strategy {
            Strategy::Migration => self.migrate(state, started)?,
            Strategy::BinaryPartition => self.partition_sweep(state, 2, started, rng)?,
            Strategy::KPartition => {
                self.partition_sweep(state, self.config.partition.k, started, rng)?
            }
            Strategy::Bisecting => self.bisect_escalating(state, started, rng)?,
        };

        let traffic_after = cross_host_traffic(&outcome.placement, &state.affinity);
        info!(
            %strategy,
            attempts = outcome.attempts,
            traffic_before,
            traffic_after,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "placement complete"
        );

        Ok(PlacementReport {
            strategy,
            placement: outcome.placement,
            alpha: outcome.alpha,
            k: outcome.k,
            attempts: outcome.attempts,
            traffic_before,
            traffic_after,
        })
    }

    fn migrate(&self, state: &ClusterState, started: Instant) -> PlacementResult<Outcome> {
        self.checkpoint(started)?;
        let pairs = state.affinity.sorted_pairs();
        let outcome =
            MigrationHeuristic::new(&state.demands).run(&state.placement, &state.hosts, &pairs);
        debug!(moves = outcome.moves.len(), "migration pass finished");
        Ok(Outcome {
            placement: outcome.placement,
            alpha: None,
            k: None,
            attempts: 1,
        })
    }

    /// Partition at decreasing alpha until the groups pack.
    fn partition_sweep<R: Rng + ?Sized>(
        &self,
        state: &ClusterState,
        k: usize,
        started: Instant,
        rng: &mut R,
    ) -> PlacementResult<Outcome> {
        let input = GroupingInput::build(state, &self.config);
        let settings = ContractionSettings::from(&self.config.partition);
        let engine = PartitionEngine::new(&input.affinity, &input.demands).with_settings(settings);
        let packer = BinPacker::new(&state.demands, &state.affinity);
        let hosts = state.vacated_hosts();
        let capacity = state.capacity();

        let mut attempts = 0;
        for alpha in alpha_sweep(self.config.partition.alpha_start, self.config.partition.alpha_step) {
            self.checkpoint(started)?;
            attempts += 1;

            let partition =
                engine.calculate_app_partitions(&input.services, capacity, alpha, k, rng)?;
            let groups = partition.len();
            let partition = input.attach_companions(partition);

            if let Some(placement) = packer.pack(&partition, &state.placement, &hosts) {
                debug!(alpha, groups, attempts, "groups packed");
                return Ok(Outcome {
                    placement,
                    alpha: Some(alpha),
                    k: Some(k),
                    attempts,
                });
            }
            debug!(alpha, groups, "packing failed, relaxing budget");
        }

        Err(PlacementError::NoFeasiblePlacement {
            strategy: self.config.strategy.to_string(),
        })
    }

    /// Cluster into `k` groups, adding one group per failed packing.
    fn bisect_escalating<R: Rng + ?Sized>(
        &self,
        state: &ClusterState,
        started: Instant,
        rng: &mut R,
    ) -> PlacementResult<Outcome> {
        let input = GroupingInput::build(state, &self.config);
        let engine = ClusterEngine::new(&input.affinity, self.config.clustering.centroids);
        let packer = BinPacker::new(&state.demands, &state.affinity);
        let hosts = state.vacated_hosts();

        let mut attempts = 0;
        let mut k = self.config.clustering.k;
        loop {
            self.checkpoint(started)?;
            attempts += 1;

            let partition = input.attach_companions(engine.cluster(&input.services, k, rng)?);
            if let Some(placement) = packer.pack(&partition, &state.placement, &hosts) {
                debug!(k, attempts, "clusters packed");
                return Ok(Outcome {
                    placement,
                    alpha: None,
                    k: Some(k),
                    attempts,
                });
            }
            if k >= input.services.len() {
                break;
            }
            k += 1;
            debug!(k, "packing failed, refining clusters");
        }

        Err(PlacementError::NoFeasiblePlacement {
            strategy: self.config.strategy.to_string(),
        })
    }

    fn checkpoint(&self, started: Instant) -> PlacementResult<()> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            warn!("placement cancelled");
            return Err(PlacementError::Cancelled);
        }
        if let Some(limit) = self.config.orchestrator.deadline_ms {
            let elapsed = started.elapsed();
            if elapsed >= Duration::from_millis(limit) {
                warn!(elapsed_ms = elapsed.as_millis() as u64, limit, "placement deadline exceeded");
                return Err(PlacementError::DeadlineExceeded {
                    elapsed_ms: elapsed.as_millis(),
                });
            }
        }
        Ok(())
    }
}

struct Outcome {
    placement: Placement,
    alpha: Option<f64>,
    k: Option<usize>,
    attempts: usize,
}

/// `start, start - step, ...` down to zero. Steps are taken from an integer
/// index so the sequence does not drift.
pub fn alpha_sweep(start: f64, step: f64) -> impl Iterator<Item = f64> {
    let steps = if step > 0.0 && start >= 0.0 {
        (start / step + 1e-9).floor() as usize
    } else {
        0
    };
    (0..=steps).map(move |i| (start - i as f64 * step).max(0.0))
}
