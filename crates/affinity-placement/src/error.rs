//! Placement engine error types.

use affinity_core::InputError;
use thiserror::Error;

/// Errors that can occur while computing a placement.
///
/// A bin-packing attempt that finds no host for a group is not an error;
/// the packer signals it with `None` and the orchestrator retries.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("invalid cluster count {k} for {services} services")]
    InvalidK { k: usize, services: usize },

    #[error("partitioning did not reach a fixed point after {iterations} iterations")]
    NoConvergence { iterations: usize },

    #[error("no live edge found after {attempts} sampling attempts")]
    SamplingExhausted { attempts: usize },

    #[error("no feasible placement found with strategy {strategy}")]
    NoFeasiblePlacement { strategy: String },

    #[error("placement deadline exceeded after {elapsed_ms} ms")]
    DeadlineExceeded { elapsed_ms: u128 },

    #[error("placement cancelled")]
    Cancelled,

    #[error("input error: {0}")]
    Input(#[from] InputError),
}

pub type PlacementResult<T> = Result<T, PlacementError>;
