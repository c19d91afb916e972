//! affinity-core — data model and input contract for the placement engine.
//!
//! The engine never talks to a monitoring backend. A collector hands it a
//! [`ClusterSnapshot`]; this crate normalizes workload names, validates every
//! number and produces the [`ClusterState`] the algorithms consume.

pub mod config;
pub mod error;
pub mod naming;
pub mod snapshot;
pub mod types;

pub use config::PlacementConfig;
pub use error::{ConfigError, InputError, InputResult};
pub use naming::{NameNormalizer, ReplicaSuffixNormalizer};
pub use snapshot::{ClusterSnapshot, RawNumber};
pub use types::*;
