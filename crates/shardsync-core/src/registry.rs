//! In-memory cluster registry.
//!
//! [`ClusterRegistry`] is the only writer of cluster status, shard interval
//! and reported load. Every mutation takes one write lock and never awaits
//! while holding it, so readers always see a consistent snapshot.
//!
//! The partition invariant is enforced here: the intervals of `Connected`
//! clusters are pairwise disjoint. It is checked both when an interval is
//! assigned and when a cluster moves to `Connected`.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::cluster::{Cluster, ConnectionStatus, ShardInterval};
use crate::errors::{Result, SyncError};
use crate::ids::ClusterId;

/// Registry of every known cluster, keyed by id.
#[derive(Debug, Default)]
pub struct ClusterRegistry {
    clusters: RwLock<BTreeMap<ClusterId, Cluster>>,
}

impl ClusterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new cluster. Registration always starts it `Disconnected`.
    pub fn register(&self, mut cluster: Cluster) -> Result<()> {
        let mut clusters = self.clusters.write();
        if clusters.contains_key(&cluster.id) {
            return Err(SyncError::ClusterExists(cluster.id));
        }
        cluster.status = ConnectionStatus::Disconnected;
        debug!(cluster_id = %cluster.id, endpoint = %cluster.endpoint, "cluster registered");
        let _ = clusters.insert(cluster.id, cluster);
        Ok(())
    }

    /// Snapshot of one cluster.
    pub fn get(&self, id: ClusterId) -> Result<Cluster> {
        self.clusters
            .read()
            .get(&id)
            .cloned()
            .ok_or(SyncError::ClusterNotFound(id))
    }

    /// Whether a cluster with this id exists.
    pub fn contains(&self, id: ClusterId) -> bool {
        self.clusters.read().contains_key(&id)
    }

    /// Snapshot of every cluster, in id order.
    pub fn all(&self) -> Vec<Cluster> {
        self.clusters.read().values().cloned().collect()
    }

    /// Every cluster id, in id order.
    pub fn ids(&self) -> Vec<ClusterId> {
        self.clusters.read().keys().copied().collect()
    }

    /// Snapshot of the clusters currently `Connected`.
    pub fn active_clusters(&self) -> Vec<Cluster> {
        self.clusters
            .read()
            .values()
            .filter(|c| c.is_active())
            .cloned()
            .collect()
    }

    /// Number of registered clusters.
    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    /// Whether no cluster is registered.
    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }

    /// Assign a shard interval.
    ///
    /// Fails when the bounds are invalid, when the cluster is `Connecting` or
    /// `Connected` (it already holds the bounds sent in its `CLUSTER_START`),
    /// or when the interval overlaps the interval of another `Connected`
    /// cluster.
    pub fn set_shard_interval(&self, id: ClusterId, min: u32, max: u32) -> Result<ShardInterval> {
        let interval = ShardInterval::new(min, max)?;
        let mut clusters = self.clusters.write();
        let status = clusters.get(&id).ok_or(SyncError::ClusterNotFound(id))?.status;
        if matches!(status, ConnectionStatus::Connecting | ConnectionStatus::Connected) {
            return Err(SyncError::invalid_range(
                min,
                max,
                format!("cluster {id} is {status}, disconnect it first"),
            ));
        }
        if let Some(other) = connected_overlap(&clusters, id, interval) {
            return Err(SyncError::invalid_range(
                min,
                max,
                format!("overlaps connected cluster {other}"),
            ));
        }
        if let Some(cluster) = clusters.get_mut(&id) {
            cluster.shard_interval = Some(interval);
        }
        debug!(cluster_id = %id, %interval, "shard interval assigned");
        Ok(interval)
    }

    /// Move a cluster to `status`, returning the previous status.
    ///
    /// Enforces the connection state machine. A move to `Connected` is
    /// refused when the cluster's interval overlaps another connected
    /// cluster.
    pub fn set_status(&self, id: ClusterId, status: ConnectionStatus) -> Result<ConnectionStatus> {
        let mut clusters = self.clusters.write();
        let cluster = clusters.get(&id).ok_or(SyncError::ClusterNotFound(id))?;
        let previous = cluster.status;
        if !previous.can_transition_to(status) {
            return Err(SyncError::InvalidTransition {
                cluster: id,
                from: previous,
                to: status,
            });
        }
        if status == ConnectionStatus::Connected {
            if let Some(interval) = cluster.shard_interval {
                if let Some(other) = connected_overlap(&clusters, id, interval) {
                    return Err(SyncError::invalid_range(
                        interval.min(),
                        interval.max(),
                        format!("overlaps connected cluster {other}"),
                    ));
                }
            }
        }
        if let Some(cluster) = clusters.get_mut(&id) {
            cluster.status = status;
        }
        debug!(cluster_id = %id, from = %previous, to = %status, "cluster status changed");
        Ok(previous)
    }

    /// Record the server count a cluster reported.
    pub fn set_reported_load(&self, id: ClusterId, load: u64) -> Result<()> {
        let mut clusters = self.clusters.write();
        let cluster = clusters.get_mut(&id).ok_or(SyncError::ClusterNotFound(id))?;
        cluster.reported_load = Some(load);
        Ok(())
    }

    /// The connected cluster whose interval contains `shard`, if any.
    pub fn owner_of(&self, shard: u32) -> Option<Cluster> {
        self.clusters
            .read()
            .values()
            .find(|c| c.is_active() && c.shard_interval.is_some_and(|iv| iv.contains(shard)))
            .cloned()
    }

    /// Largest `max` among connected clusters' intervals.
    pub fn connected_interval_ceiling(&self) -> Option<u32> {
        self.clusters
            .read()
            .values()
            .filter(|c| c.is_active())
            .filter_map(|c| c.shard_interval.map(ShardInterval::max))
            .max()
    }

    /// Count clusters per status, in state-machine order.
    pub fn status_counts(&self) -> [(ConnectionStatus, usize); 4] {
        let clusters = self.clusters.read();
        let count = |s| clusters.values().filter(|c| c.status == s).count();
        [
            (ConnectionStatus::Disconnected, count(ConnectionStatus::Disconnected)),
            (ConnectionStatus::Connecting, count(ConnectionStatus::Connecting)),
            (ConnectionStatus::Connected, count(ConnectionStatus::Connected)),
            (ConnectionStatus::Failed, count(ConnectionStatus::Failed)),
        ]
    }
}

fn connected_overlap(
    clusters: &BTreeMap<ClusterId, Cluster>,
    id: ClusterId,
    interval: ShardInterval,
) -> Option<ClusterId> {
    clusters
        .values()
        .filter(|c| c.id != id && c.is_active())
        .find(|c| c.shard_interval.is_some_and(|iv| iv.overlaps(interval)))
        .map(|c| c.id)
}
