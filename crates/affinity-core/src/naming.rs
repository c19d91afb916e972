//! Workload instance name → logical service name.
//!
//! Collectors report per-replica names such as `cartservice-7d9f8b-x2k4p`.
//! The engine only reasons about logical services, so names are normalized
//! before validation.

use std::sync::LazyLock;

use regex::Regex;

/// Maps a raw workload instance name to its logical service name.
pub trait NameNormalizer {
    fn normalize(&self, raw: &str) -> String;
}

impl<F> NameNormalizer for F
where
    F: Fn(&str) -> String,
{
    fn normalize(&self, raw: &str) -> String {
        self(raw)
    }
}

/// `<service>-<replica>[-<subid>]` → `<service>`.
///
/// The replica segment must contain a digit, otherwise the name is taken to
/// be a plain service name with a hyphen in it and returned unchanged.
static REPLICA_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<service>[a-z0-9][a-z0-9-]*?)-[a-z0-9]*[0-9][a-z0-9]*(?:-[a-z0-9]+)?$")
        .expect("replica suffix pattern is valid")
});

/// Default normalizer for Kubernetes-style pod names.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicaSuffixNormalizer;

impl NameNormalizer for ReplicaSuffixNormalizer {
    fn normalize(&self, raw: &str) -> String {
        REPLICA_SUFFIX
            .captures(raw)
            .and_then(|caps| caps.name("service"))
            .map_or_else(|| raw.to_string(), |m| m.as_str().to_string())
    }
}
