//! placement.toml configuration parser.
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which placement algorithm the orchestrator runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Single-pass pairwise migration over the current placement.
    Migration,
    /// Recursive two-way contraction partitioning, then bin-packing.
    #[default]
    BinaryPartition,
    /// Recursive k-way contraction partitioning, then bin-packing.
    KPartition,
    /// Bisecting affinity clustering into k groups, then bin-packing.
    Bisecting,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Migration => "migration",
            Strategy::BinaryPartition => "binary-partition",
            Strategy::KPartition => "k-partition",
            Strategy::Bisecting => "bisecting",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "migration" => Ok(Strategy::Migration),
            "binary-partition" => Ok(Strategy::BinaryPartition),
            "k-partition" => Ok(Strategy::KPartition),
            "bisecting" => Ok(Strategy::Bisecting),
            other => Err(ConfigError::Invalid(format!("unknown strategy: {other}"))),
        }
    }
}

/// Which collector metric is used as service affinity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AffinityMetric {
    /// Requests per second between two services.
    #[default]
    RequestRate,
    /// Mean bytes per message exchanged between two services.
    MessageSize,
}

impl fmt::Display for AffinityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffinityMetric::RequestRate => f.write_str("request-rate"),
            AffinityMetric::MessageSize => f.write_str("message-size"),
        }
    }
}

/// How the bisecting clusterer picks the two seeds of a split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CentroidPolicy {
    /// The least-related pair; unrelated pairs win immediately.
    #[default]
    MinAffinity,
    /// Two distinct members chosen uniformly at random.
    Random,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub strategy: Strategy,
    pub metric: AffinityMetric,
    /// RNG seed. Entropy-seeded when absent.
    pub seed: Option<u64>,
    pub partition: PartitionConfig,
    pub clustering: ClusteringConfig,
    pub orchestrator: OrchestratorConfig,
    /// Anchor service → services that must share its host.
    pub companions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Groups per split for the k-partition strategy.
    pub k: usize,
    pub alpha_start: f64,
    pub alpha_step: f64,
    /// Upper bound on contraction trials per split (otherwise one per service).
    pub max_trials: usize,
    /// Fixed-point guard for the recursive splitter.
    pub max_iterations: usize,
    /// Guard on edge rejection sampling inside one contraction.
    pub max_sample_attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub k: usize,
    pub centroids: CentroidPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Wall-clock budget for the whole run, in milliseconds.
    pub deadline_ms: Option<u64>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            k: 2,
            alpha_start: 1.0,
            alpha_step: 0.1,
            max_trials: 64,
            max_iterations: 10_000,
            max_sample_attempts: 100_000,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k: 3,
            centroids: CentroidPolicy::default(),
        }
    }
}

impl PlacementConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PlacementConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.partition;
        if !(0.0..=1.0).contains(&p.alpha_start) {
            return Err(ConfigError::Invalid(format!(
                "partition.alpha_start must be within [0, 1], got {}",
                p.alpha_start
            )));
        }
        if !(p.alpha_step > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "partition.alpha_step must be positive, got {}",
                p.alpha_step
            )));
        }
        if p.k < 2 {
            return Err(ConfigError::Invalid(format!(
                "partition.k must be at least 2, got {}",
                p.k
            )));
        }
        if p.max_trials == 0 || p.max_iterations == 0 || p.max_sample_attempts == 0 {
            return Err(ConfigError::Invalid(
                "partition trial, iteration and sampling limits must be non-zero".to_string(),
            ));
        }
        if self.clustering.k == 0 {
            return Err(ConfigError::Invalid("clustering.k must be at least 1".to_string()));
        }
        for (anchor, companions) in &self.companions {
            if let Some(nested) = companions.iter().find(|c| self.companions.contains_key(*c)) {
                return Err(ConfigError::Invalid(format!(
                    "companions.{anchor}: {nested} is itself an anchor"
                )));
            }
        }
        Ok(())
    }
}
