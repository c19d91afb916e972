//! Single-pass pairwise migration over an existing placement.
//!
//! Walks affinity pairs from heaviest to lightest and tries to colocate each
//! pair by moving one endpoint. A service is moved at most once per pass and
//! never again once its pair is settled; there is no backtracking.

use std::collections::HashSet;

use affinity_core::{AffinityPair, Demands, HostId, HostResources, Placement, ServiceId};
use tracing::{debug, trace};

/// One relocation performed during a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Move {
    pub service: ServiceId,
    pub from: HostId,
    pub to: HostId,
}

/// Result of a migration pass.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub placement: Placement,
    /// Host counters after every move.
    pub hosts: Vec<HostResources>,
    pub moves: Vec<Move>,
}

pub struct MigrationHeuristic<'a> {
    demands: &'a Demands,
}

impl<'a> MigrationHeuristic<'a> {
    pub fn new(demands: &'a Demands) -> Self {
        Self { demands }
    }

    /// Refine `placement` against `pairs`, which must be sorted by
    /// descending weight. Always succeeds; may change nothing.
    pub fn migrate(
        &self,
        placement: &Placement,
        hosts: &[HostResources],
        pairs: &[AffinityPair],
    ) -> Placement {
        self.run(placement, hosts, pairs).placement
    }

    /// Same as [`migrate`](Self::migrate), also returning the updated host
    /// counters and the list of moves.
    pub fn run(
        &self,
        placement: &Placement,
        hosts: &[HostResources],
        pairs: &[AffinityPair],
    ) -> MigrationOutcome {
        let mut placement = placement.clone();
        let mut hosts = hosts.to_vec();
        let mut settled: HashSet<ServiceId> = HashSet::new();
        let mut moves = Vec::new();

        for pair in pairs {
            let (Some(src_host), Some(dst_host)) = (
                placement.host_of(&pair.source).map(str::to_string),
                placement.host_of(&pair.destination).map(str::to_string),
            ) else {
                trace!(source = %pair.source, destination = %pair.destination, "pair not placed");
                continue;
            };

            if src_host == dst_host {
                settled.insert(pair.source.clone());
                settled.insert(pair.destination.clone());
                continue;
            }
            if settled.contains(&pair.source) || settled.contains(&pair.destination) {
                continue;
            }

            let source_demand = self.demands.get(&pair.source).copied().unwrap_or_default();
            let dest_demand = self.demands.get(&pair.destination).copied().unwrap_or_default();

            // Smaller footprint moves first; the other direction is the fallback.
            let candidates = if source_demand.footprint_cmp(&dest_demand).is_le() {
                [
                    (&pair.source, &src_host, &dst_host),
                    (&pair.destination, &dst_host, &src_host),
                ]
            } else {
                [
                    (&pair.destination, &dst_host, &src_host),
                    (&pair.source, &src_host, &dst_host),
                ]
            };

            for (service, from, to) in candidates {
                if self.try_move(&mut placement, &mut hosts, service, from, to) {
                    debug!(
                        %service,
                        %from,
                        %to,
                        weight = pair.weight,
                        "migrated service"
                    );
                    moves.push(Move {
                        service: service.clone(),
                        from: from.clone(),
                        to: to.clone(),
                    });
                    settled.insert(pair.source.clone());
                    settled.insert(pair.destination.clone());
                    break;
                }
            }
        }

        MigrationOutcome {
            placement,
            hosts,
            moves,
        }
    }

    fn try_move(
        &self,
        placement: &mut Placement,
        hosts: &mut [HostResources],
        service: &str,
        from: &str,
        to: &str,
    ) -> bool {
        let demand = self.demands.get(service).copied().unwrap_or_default();
        let Some(to_index) = hosts.iter().position(|h| h.host_id == to) else {
            return false;
        };
        if !hosts[to_index].can_fit(demand) {
            return false;
        }
        if !placement.move_service(service, from, to) {
            return false;
        }
        hosts[to_index].reserve(demand);
        if let Some(origin) = hosts.iter_mut().find(|h| h.host_id == from) {
            origin.release(demand);
        }
        true
    }
}
