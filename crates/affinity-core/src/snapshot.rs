//! Collector snapshot — the engine's only input contract.
//!
//! A snapshot is whatever the metrics collector scraped: raw workload names,
//! numbers that may arrive as JSON numbers or decimal strings, and two
//! alternative affinity metrics. [`ClusterSnapshot::into_state`] turns it
//! into a validated [`ClusterState`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AffinityMetric;
use crate::error::{InputError, InputResult};
use crate::naming::NameNormalizer;
use crate::types::{AffinityMap, ClusterState, Demands, HostResources, Placement, ResourceDemand};

/// A number as reported by the collector: either a JSON number or a
/// decimal string such as `"0.250"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    /// Parse as a finite, non-negative float. `field` names the value in errors.
    pub fn parse(&self, field: &str) -> InputResult<f64> {
        let invalid = |value: String| InputError::InvalidNumber {
            field: field.to_string(),
            value,
        };
        let value = match self {
            RawNumber::Number(v) => *v,
            RawNumber::Text(s) => s.trim().parse::<f64>().map_err(|_| invalid(s.clone()))?,
        };
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(value.to_string()));
        }
        Ok(value)
    }
}

impl From<f64> for RawNumber {
    fn from(v: f64) -> Self {
        RawNumber::Number(v)
    }
}

impl From<&str> for RawNumber {
    fn from(s: &str) -> Self {
        RawNumber::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDemand {
    pub cpu: RawNumber,
    pub ram: RawNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHost {
    pub available_cpu: RawNumber,
    pub available_ram: RawNumber,
    pub used_cpu: RawNumber,
    pub used_ram: RawNumber,
}

type RawAffinity = BTreeMap<String, BTreeMap<String, RawNumber>>;

/// Unvalidated collector output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Logical service list. Derived from the placement when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    /// Raw workload name → resource requests.
    pub demands: BTreeMap<String, RawDemand>,
    pub hosts: BTreeMap<String, RawHost>,
    /// Host → raw workload names currently running there.
    #[serde(default)]
    pub placement: BTreeMap<String, Vec<String>>,
    /// Request-rate affinity between logical services.
    #[serde(default)]
    pub affinity: RawAffinity,
    /// Mean message size exchanged between logical services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_size_affinity: Option<RawAffinity>,
}

impl ClusterSnapshot {
    pub fn from_file(path: &Path) -> InputResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> InputResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Normalize names, parse every number and cross-check references.
    pub fn into_state(
        self,
        metric: AffinityMetric,
        normalizer: &dyn NameNormalizer,
    ) -> InputResult<ClusterState> {
        let demands = parse_demands(&self.demands, normalizer)?;
        let hosts = parse_hosts(&self.hosts)?;
        let placement = parse_placement(&self.placement, &hosts, normalizer)?;

        let services = match self.services {
            Some(list) => dedup(list),
            None => dedup(
                placement
                    .hosts()
                    .flat_map(|(_, services)| services.iter().cloned())
                    .collect(),
            ),
        };
        if let Some(missing) = services.iter().find(|s| !demands.contains_key(*s)) {
            return Err(InputError::MissingDemand(missing.clone()));
        }
        let known: HashSet<&str> = services.iter().map(String::as_str).collect();
        if let Some(unlisted) = placement
            .hosts()
            .flat_map(|(_, placed)| placed.iter())
            .find(|s| !known.contains(s.as_str()))
        {
            return Err(InputError::UnlistedService(unlisted.clone()));
        }

        let raw_affinity = match metric {
            AffinityMetric::RequestRate => &self.affinity,
            AffinityMetric::MessageSize => self
                .message_size_affinity
                .as_ref()
                .ok_or_else(|| InputError::MissingMetric(metric.to_string()))?,
        };
        let affinity = parse_affinity(raw_affinity, &known)?;

        debug!(
            services = services.len(),
            hosts = hosts.len(),
            affinities = affinity.len(),
            %metric,
            "snapshot validated"
        );

        Ok(ClusterState {
            services,
            demands,
            hosts,
            placement,
            affinity,
        })
    }
}

fn parse_demands(
    raw: &BTreeMap<String, RawDemand>,
    normalizer: &dyn NameNormalizer,
) -> InputResult<Demands> {
    let mut demands = Demands::new();
    for (name, demand) in raw {
        let cpu = demand.cpu.parse(&format!("demands.{name}.cpu"))?;
        let ram = demand.ram.parse(&format!("demands.{name}.ram"))?;
        let service = normalizer.normalize(name);
        if demands.contains_key(&service) {
            debug!(%name, %service, "ignoring demand of additional replica");
            continue;
        }
        demands.insert(service, ResourceDemand::new(cpu, ram));
    }
    Ok(demands)
}

fn parse_hosts(raw: &BTreeMap<String, RawHost>) -> InputResult<Vec<HostResources>> {
    raw.iter()
        .map(|(id, h)| {
            Ok(HostResources::new(
                id.clone(),
                h.available_cpu.parse(&format!("hosts.{id}.available_cpu"))?,
                h.available_ram.parse(&format!("hosts.{id}.available_ram"))?,
                h.used_cpu.parse(&format!("hosts.{id}.used_cpu"))?,
                h.used_ram.parse(&format!("hosts.{id}.used_ram"))?,
            ))
        })
        .collect()
}

fn parse_placement(
    raw: &BTreeMap<String, Vec<String>>,
    hosts: &[HostResources],
    normalizer: &dyn NameNormalizer,
) -> InputResult<Placement> {
    let mut placement = Placement::new();
    for host in hosts {
        placement.ensure_host(host.host_id.clone());
    }

    let mut seen = HashSet::new();
    for (host, workloads) in raw {
        if !hosts.iter().any(|h| &h.host_id == host) {
            return Err(InputError::UnknownHost(host.clone()));
        }
        for workload in workloads {
            let service = normalizer.normalize(workload);
            if !seen.insert(service.clone()) {
                warn!(%workload, %service, %host, "service already placed, keeping first host");
                continue;
            }
            placement.assign(host.clone(), service);
        }
    }
    Ok(placement)
}

fn parse_affinity(raw: &RawAffinity, known: &HashSet<&str>) -> InputResult<AffinityMap> {
    let mut affinity = AffinityMap::new();
    for (source, dests) in raw {
        for (dest, weight) in dests {
            let weight = weight.parse(&format!("affinity.{source}.{dest}"))?;
            if !known.contains(source.as_str()) || !known.contains(dest.as_str()) {
                warn!(%source, %dest, "dropping affinity for unknown service");
                continue;
            }
            affinity.insert(source.clone(), dest.clone(), weight);
        }
    }
    Ok(affinity)
}

fn dedup(list: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    list.into_iter().filter(|s| seen.insert(s.clone())).collect()
}
