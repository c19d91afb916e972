//! Bisecting affinity clustering.
//!
//! Starts from one cluster holding every service and splits until exactly
//! `k` clusters exist. Each round splits the least cohesive splittable
//! cluster: two centroids are chosen, and every other member joins the
//! centroid it exchanges more affinity with.

use affinity_core::config::CentroidPolicy;
use affinity_core::{AffinityMap, Partition, ServiceId};
use rand::Rng;
use tracing::debug;

use crate::error::{PlacementError, PlacementResult};

#[derive(Debug, Clone)]
struct Cluster {
    members: Vec<ServiceId>,
    /// Affinity gathered by the cluster's centroid when it was formed.
    cohesion: f64,
}

pub struct ClusterEngine<'a> {
    affinity: &'a AffinityMap,
    policy: CentroidPolicy,
}

impl<'a> ClusterEngine<'a> {
    pub fn new(affinity: &'a AffinityMap, policy: CentroidPolicy) -> Self {
        Self { affinity, policy }
    }

    /// Produce exactly `k` clusters covering `services`.
    ///
    /// Fails with [`PlacementError::InvalidK`] unless `1 <= k <= |services|`.
    pub fn cluster<R: Rng + ?Sized>(
        &self,
        services: &[ServiceId],
        k: usize,
        rng: &mut R,
    ) -> PlacementResult<Partition> {
        if k < 1 || k > services.len() {
            return Err(PlacementError::InvalidK {
                k,
                services: services.len(),
            });
        }

        let mut clusters = vec![Cluster {
            members: services.to_vec(),
            cohesion: 0.0,
        }];

        for round in 1..k {
            // Lowest cohesion first; `min_by` keeps the earliest on ties.
            let Some(index) = clusters
                .iter()
                .enumerate()
                .filter(|(_, c)| c.members.len() > 1)
                .min_by(|(_, a), (_, b)| a.cohesion.total_cmp(&b.cohesion))
                .map(|(i, _)| i)
            else {
                break;
            };
            let parent = clusters.remove(index);
            let (first, second) = self.centroids(&parent.members, rng);

            let mut left = Cluster {
                members: vec![first.clone()],
                cohesion: 0.0,
            };
            let mut right = Cluster {
                members: vec![second.clone()],
                cohesion: 0.0,
            };

            for service in parent
                .members
                .into_iter()
                .filter(|s| *s != first && *s != second)
            {
                let to_left = self.affinity.pair_weight(&service, &first);
                let to_right = self.affinity.pair_weight(&service, &second);
                left.cohesion += to_left;
                right.cohesion += to_right;

                let join_left = if to_left == to_right {
                    rng.gen_bool(0.5)
                } else {
                    to_left > to_right
                };
                if join_left {
                    left.members.push(service);
                } else {
                    right.members.push(service);
                }
            }

            debug!(
                round,
                %first,
                %second,
                left = left.members.len(),
                right = right.members.len(),
                "bisected cluster"
            );
            clusters.push(left);
            clusters.push(right);
        }

        let mut partition = Partition::new();
        for cluster in clusters {
            partition.push_group(cluster.members.into_iter().collect());
        }
        Ok(partition)
    }

    /// Pick the two seeds of a split. `members` has at least two entries.
    fn centroids<R: Rng + ?Sized>(
        &self,
        members: &[ServiceId],
        rng: &mut R,
    ) -> (ServiceId, ServiceId) {
        if members.len() == 2 {
            return (members[0].clone(), members[1].clone());
        }
        match self.policy {
            CentroidPolicy::MinAffinity => self.least_related_pair(members),
            CentroidPolicy::Random => {
                let i = rng.gen_range(0..members.len());
                let mut j = rng.gen_range(0..members.len() - 1);
                if j >= i {
                    j += 1;
                }
                (members[i].clone(), members[j].clone())
            }
        }
    }

    /// The first pair with no recorded affinity at all, otherwise the pair
    /// with the smallest recorded affinity in either direction.
    fn least_related_pair(&self, members: &[ServiceId]) -> (ServiceId, ServiceId) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..members.len() {
            for j in i + 1..members.len() {
                let (a, b) = (&members[i], &members[j]);
                let recorded = match (self.affinity.weight(a, b), self.affinity.weight(b, a)) {
                    (None, None) => return (a.clone(), b.clone()),
                    (Some(w), None) | (None, Some(w)) => w,
                    (Some(x), Some(y)) => x.min(y),
                };
                if best.is_none_or(|(_, _, w)| recorded < w) {
                    best = Some((i, j, recorded));
                }
            }
        }
        let (i, j, _) = best.unwrap_or((0, 1, 0.0));
        (members[i].clone(), members[j].clone())
    }
}
