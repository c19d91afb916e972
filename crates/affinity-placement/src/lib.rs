//! affinity-placement — affinity-aware service placement.
//!
//! Decides which host each service of an application should run on so that
//! chatty services end up together without overcommitting any host. Inputs
//! come from `affinity-core`; nothing here talks to a cluster.
//!
//! # Components
//!
//! - **`graph`** — Undirected affinity graph over a service set
//! - **`contraction`** — Randomized weighted contraction and the recursive,
//!   budget-driven partitioner
//! - **`bisect`** — Bisecting affinity clustering into exactly `k` groups
//! - **`packer`** — Group-to-host bin-packing scored by avoided traffic
//! - **`migration`** — Single-pass pairwise refinement of a live placement
//! - **`orchestrator`** — Strategy selection, alpha sweep, deadline and
//!   cancellation
//! - **`report`** — Placement report and cross-host traffic accounting

pub mod bisect;
pub mod contraction;
pub mod error;
pub mod graph;
pub mod migration;
pub mod orchestrator;
pub mod packer;
pub mod report;

pub use bisect::ClusterEngine;
pub use contraction::{Contraction, ContractionSettings, PartitionEngine, contract_once};
pub use error::{PlacementError, PlacementResult};
pub use graph::AffinityGraph;
pub use migration::{MigrationHeuristic, MigrationOutcome, Move};
pub use orchestrator::{PlacementOrchestrator, alpha_sweep};
pub use packer::{BinPacker, HostScore, score_host};
pub use report::{PlacementReport, cross_host_traffic};
