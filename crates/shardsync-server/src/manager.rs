//! Cluster lifecycle, routing and broadcast.
//!
//! [`ConnectionManager`] ties the [`ClusterRegistry`] to the [`ChannelPool`].
//! It is the only component that moves clusters between connection states
//! and the only public way to send to clusters; handlers and the rate-limit
//! coordinator go through it rather than the pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use metrics::counter;
use parking_lot::RwLock;
use shardsync_core::events::{ClusterStart, EventPayload};
use shardsync_core::{
    Cluster, ClusterId, ClusterRegistry, ConnectionStatus, Result, SenderId, ShardInterval,
    SyncError, SyncFrame, routing,
};
use shardsync_settings::SyncSettings;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::channel::{ChannelPool, CloseReason, Connector, LinkEvent};
use crate::metrics::{SYNC_BROADCAST_FAILURES_TOTAL, SYNC_CONNECT_TOTAL};
use crate::pool::WorkerPool;
use crate::shards::ShardCountSource;

/// Static inputs for a [`ConnectionManager`].
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Sender id stamped on outbound frames.
    pub sender_id: SenderId,
    /// Configured shard total, if any.
    pub total_shards: Option<u32>,
    /// Bound on channel open plus handshake.
    pub connect_timeout: Duration,
    /// Wait for `HANDSHAKE` when auto-connecting on start.
    pub expect_handshake: bool,
    /// Malformed frames in a row that tear a channel down.
    pub max_bad_frames: u32,
    /// Clusters registered by `start`.
    pub clusters: Vec<Cluster>,
}

impl ManagerConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        let mut clusters = Vec::with_capacity(settings.clusters.len());
        for entry in &settings.clusters {
            let mut cluster = Cluster::new(ClusterId::new(entry.id), entry.endpoint.clone())
                .with_auto_connect(entry.auto_connect);
            if let (Some(min), Some(max)) = (entry.shard_min, entry.shard_max) {
                cluster = cluster.with_shard_interval(ShardInterval::new(min, max)?);
            }
            clusters.push(cluster);
        }
        let coordinator = &settings.coordinator;
        Ok(Self {
            sender_id: SenderId::new(coordinator.sender_id.clone()),
            total_shards: coordinator.total_shards,
            connect_timeout: Duration::from_millis(coordinator.connect_timeout_ms),
            expect_handshake: coordinator.expect_handshake,
            max_bad_frames: coordinator.max_consecutive_bad_frames,
            clusters,
        })
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            sender_id: SenderId::default(),
            total_shards: None,
            connect_timeout: Duration::from_secs(10),
            expect_handshake: true,
            max_bad_frames: 5,
            clusters: Vec::new(),
        }
    }
}

/// Result of one broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clusters that were connected when the broadcast started.
    pub attempted: usize,
    /// Recipients whose queue accepted the frame.
    pub delivered: usize,
    /// Recipients that could not be reached.
    pub failed: Vec<ClusterId>,
}

/// Outcome of restarting one cluster.
#[derive(Debug)]
pub struct RestartOutcome {
    /// The cluster.
    pub cluster_id: ClusterId,
    /// Why reconnecting failed, if it did.
    pub error: Option<SyncError>,
}

/// Result of [`ConnectionManager::restart`], in registry order.
#[derive(Debug, Default)]
pub struct RestartReport {
    /// One entry per registered cluster.
    pub outcomes: Vec<RestartOutcome>,
}

impl RestartReport {
    /// Clusters that reconnected.
    pub fn succeeded(&self) -> Vec<ClusterId> {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_none())
            .map(|o| o.cluster_id)
            .collect()
    }

    /// Clusters that failed to reconnect.
    pub fn failed(&self) -> Vec<ClusterId> {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_some())
            .map(|o| o.cluster_id)
            .collect()
    }
}

/// Orchestrates the registry and the channel pool.
pub struct ConnectionManager {
    registry: ClusterRegistry,
    channels: ChannelPool,
    total_shards: RwLock<Option<u32>>,
    sender_id: SenderId,
    connect_timeout: Duration,
    expect_handshake: bool,
    configured: Vec<Cluster>,
    started: AtomicBool,
    pool: WorkerPool,
    shard_source: Option<Arc<dyn ShardCountSource>>,
    /// Connection id of the channel each cluster was last connected through.
    connections: DashMap<ClusterId, String>,
}

impl ConnectionManager {
    /// Create a manager. Link events from every channel arrive on the
    /// returned receiver and must be pumped (see [`crate::service`]).
    pub fn new(
        config: ManagerConfig,
        connector: Arc<dyn Connector>,
        pool: WorkerPool,
        shard_source: Option<Arc<dyn ShardCountSource>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<LinkEvent>) {
        let (channels, events) = ChannelPool::new(connector, config.max_bad_frames);
        let manager = Self {
            registry: ClusterRegistry::new(),
            channels,
            total_shards: RwLock::new(config.total_shards),
            sender_id: config.sender_id,
            connect_timeout: config.connect_timeout,
            expect_handshake: config.expect_handshake,
            configured: config.clusters,
            started: AtomicBool::new(false),
            pool,
            shard_source,
            connections: DashMap::new(),
        };
        (Arc::new(manager), events)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Register the configured clusters, resolve the shard total and submit a
    /// connect for every auto-connect cluster.
    ///
    /// Returns the handles of the submitted connects. A second call is a
    /// no-op.
    pub async fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            info!("coordinator already started, ignoring");
            return Vec::new();
        }

        for cluster in &self.configured {
            if let Err(e) = self.registry.register(cluster.clone()) {
                warn!(cluster_id = %cluster.id, error = %e, "skipping configured cluster");
            }
        }

        if self.total_shards().is_none() {
            if let Some(source) = &self.shard_source {
                match source.total_shards().await {
                    Ok(total) => {
                        *self.total_shards.write() = Some(total);
                        info!(total, "total shards resolved from shard source");
                    }
                    Err(e) => warn!(error = %e, "could not resolve total shards"),
                }
            }
        }

        let handles: Vec<_> = self
            .registry
            .all()
            .into_iter()
            .filter(|c| c.auto_connect)
            .map(|c| self.submit_connect_cluster(c.id, self.expect_handshake, false))
            .collect();
        info!(
            clusters = self.registry.len(),
            auto_connect = handles.len(),
            total_shards = ?self.total_shards(),
            "coordinator started"
        );
        handles
    }

    /// Whether [`start`](Self::start) has run.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Register a cluster outside of configuration.
    pub fn add_cluster(&self, cluster: Cluster) -> Result<()> {
        self.registry.register(cluster)
    }

    /// Connect a cluster on the worker pool. Failures are logged.
    pub fn submit_connect_cluster(
        self: &Arc<Self>,
        id: ClusterId,
        expect_initial_sync: bool,
        is_reconnect: bool,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        self.pool.spawn(async move {
            if let Err(e) = manager.connect_cluster(id, expect_initial_sync, is_reconnect).await {
                warn!(cluster_id = %id, error = %e, code = e.code(), "connect failed");
            }
        })
    }

    /// Connect a cluster and wait for the outcome.
    ///
    /// Moves the cluster to `Connecting`, opens its channel, sends
    /// `CLUSTER_START` and, when `expect_initial_sync` is set, waits for the
    /// cluster's `HANDSHAKE`. Open and handshake share one connect timeout.
    /// On any failure after `Connecting` the channel is closed and the
    /// cluster ends `Failed`.
    #[instrument(skip(self), fields(cluster_id = %id))]
    pub async fn connect_cluster(
        &self,
        id: ClusterId,
        expect_initial_sync: bool,
        is_reconnect: bool,
    ) -> Result<()> {
        let _ = self.registry.set_status(id, ConnectionStatus::Connecting)?;
        match self.establish(id, expect_initial_sync, is_reconnect).await {
            Ok(()) => {
                counter!(SYNC_CONNECT_TOTAL, "outcome" => "connected").increment(1);
                info!(reconnect = is_reconnect, "cluster connected");
                Ok(())
            }
            Err(e) => {
                counter!(SYNC_CONNECT_TOTAL, "outcome" => "failed").increment(1);
                let _ = self.channels.close(id);
                let _ = self.connections.remove(&id);
                self.mark_failed(id);
                Err(e)
            }
        }
    }

    async fn establish(&self, id: ClusterId, expect_initial_sync: bool, is_reconnect: bool) -> Result<()> {
        let cluster = self.registry.get(id)?;
        let deadline = Instant::now() + self.connect_timeout;
        let timed_out = || SyncError::ConnectTimeout {
            cluster: id,
            timeout: self.connect_timeout,
        };

        let (channel, handshake) = tokio::time::timeout_at(deadline, self.channels.open(&cluster))
            .await
            .map_err(|_| timed_out())??;
        let _ = self
            .connections
            .insert(id, channel.connection_id().to_owned());

        let start = EventPayload::ClusterStart(ClusterStart {
            cluster_id: id,
            total_shards: self.total_shards(),
            shard_min: cluster.shard_interval.map(ShardInterval::min),
            shard_max: cluster.shard_interval.map(ShardInterval::max),
            reconnect: is_reconnect,
        });
        channel.send(&self.frame(&start)?)?;

        if expect_initial_sync {
            let handshake = tokio::time::timeout_at(deadline, handshake)
                .await
                .map_err(|_| timed_out())?
                .map_err(|_| SyncError::ChannelClosed(id))?;
            debug!(server_count = ?handshake.server_count, "handshake received");
            if let Some(load) = handshake.server_count {
                self.registry.set_reported_load(id, load)?;
            }
        }

        let _ = self.registry.set_status(id, ConnectionStatus::Connected)?;
        Ok(())
    }

    /// Close a cluster's channel and mark it `Disconnected`.
    ///
    /// Returns the status the cluster had before.
    #[instrument(skip(self), fields(cluster_id = %id))]
    pub fn disconnect_cluster(&self, id: ClusterId) -> Result<ConnectionStatus> {
        let _ = self.registry.get(id)?;
        let _ = self.channels.close(id);
        let _ = self.connections.remove(&id);
        let previous = self.registry.set_status(id, ConnectionStatus::Disconnected)?;
        info!(from = %previous, "cluster disconnected");
        Ok(previous)
    }

    /// Disconnect then reconnect every cluster, one after another in
    /// registry order. A failure never stops the remaining clusters.
    pub async fn restart(&self) -> RestartReport {
        let mut report = RestartReport::default();
        for id in self.registry.ids() {
            if let Err(e) = self.disconnect_cluster(id) {
                warn!(cluster_id = %id, error = %e, "disconnect before restart failed");
            }
            let error = self.connect_cluster(id, true, true).await.err();
            if let Some(e) = &error {
                warn!(cluster_id = %id, error = %e, "restart failed for cluster");
            }
            report.outcomes.push(RestartOutcome { cluster_id: id, error });
        }
        info!(
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            "restart finished"
        );
        report
    }

    /// Close every channel and mark every cluster `Disconnected`.
    pub fn disconnect_all(&self) {
        self.channels.close_all();
        self.connections.clear();
        for id in self.registry.ids() {
            if let Err(e) = self.registry.set_status(id, ConnectionStatus::Disconnected) {
                debug!(cluster_id = %id, error = %e, "could not mark disconnected");
            }
        }
    }

    /// React to a channel that ended on its own.
    ///
    /// Events from a channel that has since been replaced or closed locally
    /// are ignored.
    pub fn handle_channel_closed(&self, id: ClusterId, connection_id: &str, reason: CloseReason) {
        if self
            .connections
            .remove_if(&id, |_, current| current == connection_id)
            .is_none()
        {
            debug!(cluster_id = %id, connection_id, "ignoring close of stale channel");
            return;
        }
        let status = self.registry.get(id).map(|c| c.status);
        if matches!(status, Ok(ConnectionStatus::Connected | ConnectionStatus::Connecting)) {
            self.mark_failed(id);
            warn!(cluster_id = %id, connection_id, reason = reason.as_str(), "cluster channel failed");
        }
    }

    fn mark_failed(&self, id: ClusterId) {
        if let Err(e) = self.registry.set_status(id, ConnectionStatus::Failed) {
            debug!(cluster_id = %id, error = %e, "could not mark failed");
        }
    }

    // ── Shards & routing ────────────────────────────────────────────

    /// Fleet-wide shard total, if known.
    pub fn total_shards(&self) -> Option<u32> {
        *self.total_shards.read()
    }

    /// Reconfigure the shard total.
    ///
    /// Rejects 0 and any total below the upper bound of a connected
    /// cluster's interval.
    pub fn set_total_shards(&self, total: u32) -> Result<()> {
        if total == 0 {
            return Err(SyncError::invalid_range(0, total, "total shards must be positive"));
        }
        if let Some(ceiling) = self.registry.connected_interval_ceiling() {
            if total < ceiling {
                return Err(SyncError::invalid_range(
                    0,
                    total,
                    format!("a connected cluster owns shards up to {ceiling}"),
                ));
            }
        }
        *self.total_shards.write() = Some(total);
        info!(total, "total shards set");
        Ok(())
    }

    /// Shard owning `entity_id`.
    pub fn resolve_shard(&self, entity_id: u64) -> Result<u32> {
        let total = self.total_shards().ok_or(SyncError::NotConfigured)?;
        routing::shard_for_entity(entity_id, total)
    }

    /// Connected cluster owning `entity_id`. Never a disconnected owner.
    pub fn resolve_cluster(&self, entity_id: u64) -> Result<Cluster> {
        let shard = self.resolve_shard(entity_id)?;
        self.registry
            .owner_of(shard)
            .ok_or(SyncError::NoShardOwner { shard })
    }

    /// Assign a cluster's shard interval. `max` may not exceed the total.
    pub fn set_shard_interval(&self, id: ClusterId, min: u32, max: u32) -> Result<ShardInterval> {
        if let Some(total) = self.total_shards() {
            if max > total {
                return Err(SyncError::invalid_range(
                    min,
                    max,
                    format!("exceeds total shards {total}"),
                ));
            }
        }
        self.registry.set_shard_interval(id, min, max)
    }

    // ── Messaging ───────────────────────────────────────────────────

    /// Send `payload` to every cluster connected at call time.
    ///
    /// Every recipient is attempted; one failure does not stop the rest.
    pub fn broadcast(&self, payload: &EventPayload) -> Result<BroadcastReport> {
        let frame = self.frame(payload)?;
        let recipients = self.registry.active_clusters();
        let mut report = BroadcastReport {
            attempted: recipients.len(),
            ..BroadcastReport::default()
        };
        for cluster in recipients {
            match self.channels.send(cluster.id, &frame) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    counter!(SYNC_BROADCAST_FAILURES_TOTAL, "event" => frame.event.clone()).increment(1);
                    warn!(cluster_id = %cluster.id, event = %frame.event, error = %e, "broadcast recipient failed");
                    report.failed.push(cluster.id);
                }
            }
        }
        debug!(
            event = %frame.event,
            attempted = report.attempted,
            delivered = report.delivered,
            "broadcast sent"
        );
        Ok(report)
    }

    /// Send `payload` to one cluster.
    pub fn send_to(&self, id: ClusterId, payload: &EventPayload) -> Result<()> {
        let frame = self.frame(payload)?;
        self.channels.send(id, &frame)
    }

    fn frame(&self, payload: &EventPayload) -> Result<SyncFrame> {
        Ok(SyncFrame::from_payload(self.sender_id.clone(), payload)?)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Record a cluster's reported server count.
    pub fn record_load(&self, id: ClusterId, load: u64) -> Result<()> {
        self.registry.set_reported_load(id, load)
    }

    /// Snapshot of one cluster.
    pub fn cluster(&self, id: ClusterId) -> Result<Cluster> {
        self.registry.get(id)
    }

    /// Snapshot of every cluster, in id order.
    pub fn clusters(&self) -> Vec<Cluster> {
        self.registry.all()
    }

    /// Snapshot of the connected clusters.
    pub fn active_clusters(&self) -> Vec<Cluster> {
        self.registry.active_clusters()
    }

    /// The underlying registry.
    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Number of open channels.
    pub fn open_channels(&self) -> usize {
        self.channels.open_count()
    }

    /// Sender id on outbound frames.
    pub fn sender_id(&self) -> &SenderId {
        &self.sender_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MemoryConnector, MemoryPeer};
    use crate::shards::FixedShardCount;
    use assert_matches::assert_matches;
    use shardsync_core::events::tags;

    struct Harness {
        manager: Arc<ConnectionManager>,
        connector: MemoryConnector,
        peers: mpsc::UnboundedReceiver<MemoryPeer>,
        _events: mpsc::UnboundedReceiver<LinkEvent>,
    }

    fn harness(config: ManagerConfig) -> Harness {
        let (connector, peers) = MemoryConnector::new();
        let (manager, events) = ConnectionManager::new(
            config,
            Arc::new(connector.clone()),
            WorkerPool::new(4),
            None,
        );
        Harness {
            manager,
            connector,
            peers,
            _events: events,
        }
    }

    fn config(clusters: &[(u32, Option<(u32, u32)>)]) -> ManagerConfig {
        ManagerConfig {
            total_shards: Some(20),
            connect_timeout: Duration::from_millis(500),
            clusters: clusters
                .iter()
                .map(|(id, bounds)| {
                    let mut c = Cluster::new(ClusterId::new(*id), format!("mem://{id}"));
                    if let Some((min, max)) = bounds {
                        c = c.with_shard_interval(ShardInterval::new(*min, *max).unwrap());
                    }
                    c
                })
                .collect(),
            ..ManagerConfig::default()
        }
    }

    fn cid(n: u32) -> ClusterId {
        ClusterId::new(n)
    }

    #[tokio::test]
    async fn connect_without_handshake_sends_cluster_start() {
        let mut h = harness(config(&[(1, Some((0, 10)))]));
        let _ = h.manager.start().await;
        h.manager.connect_cluster(cid(1), false, false).await.unwrap();

        let mut peer = h.peers.recv().await.unwrap();
        let frame = peer.recv_frame().await.unwrap();
        assert_eq!(frame.event, tags::CLUSTER_START);
        assert_eq!(frame.sender_id.as_str(), "sync");
        assert_eq!(frame.data["shardMin"], 0);
        assert_eq!(frame.data["shardMax"], 10);
        assert_eq!(frame.data["totalShards"], 20);
        assert_eq!(frame.data["reconnect"], false);
        assert_eq!(h.manager.cluster(cid(1)).unwrap().status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn handshake_timeout_marks_failed() {
        let mut h = harness(config(&[(1, None)]));
        let _ = h.manager.start().await;
        let result = h.manager.connect_cluster(cid(1), true, false).await;
        assert_matches!(result, Err(SyncError::ConnectTimeout { .. }));
        assert_eq!(h.manager.cluster(cid(1)).unwrap().status, ConnectionStatus::Failed);
        assert_eq!(h.manager.open_channels(), 0);
        let _peer = h.peers.recv().await.unwrap();
    }

    #[tokio::test]
    async fn handshake_records_load() {
        let mut h = harness(config(&[(1, None)]));
        let _ = h.manager.start().await;
        let manager = Arc::clone(&h.manager);
        let connect = tokio::spawn(async move { manager.connect_cluster(cid(1), true, false).await });
        let peer = h.peers.recv().await.unwrap();
        assert!(peer.handshake(Some(321)).await);
        connect.await.unwrap().unwrap();
        let cluster = h.manager.cluster(cid(1)).unwrap();
        assert_eq!(cluster.status, ConnectionStatus::Connected);
        assert_eq!(cluster.reported_load, Some(321));
    }

    #[tokio::test]
    async fn refused_connect_marks_failed() {
        let h = harness(config(&[(1, None)]));
        let _ = h.manager.start().await;
        h.connector.refuse(cid(1));
        assert_matches!(
            h.manager.connect_cluster(cid(1), false, false).await,
            Err(SyncError::Connect { .. })
        );
        assert_eq!(h.manager.cluster(cid(1)).unwrap().status, ConnectionStatus::Failed);
    }

    #[tokio::test]
    async fn connect_unknown_cluster_is_not_found() {
        let h = harness(config(&[]));
        assert_matches!(
            h.manager.connect_cluster(cid(9), false, false).await,
            Err(SyncError::ClusterNotFound(_))
        );
    }

    #[tokio::test]
    async fn start_is_idempotent_and_auto_connects() {
        let mut cfg = config(&[(1, None), (2, None)]);
        cfg.expect_handshake = false;
        cfg.clusters[1].auto_connect = false;
        cfg.clusters[0].auto_connect = true;
        let h = harness(cfg);

        let handles = h.manager.start().await;
        assert_eq!(handles.len(), 1);
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(h.manager.start().await.is_empty());
        assert_eq!(h.manager.clusters().len(), 2);
        assert_eq!(h.manager.cluster(cid(1)).unwrap().status, ConnectionStatus::Connected);
        assert_eq!(h.manager.cluster(cid(2)).unwrap().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn start_resolves_total_from_source() {
        let (connector, _peers) = MemoryConnector::new();
        let (manager, _events) = ConnectionManager::new(
            ManagerConfig::default(),
            Arc::new(connector),
            WorkerPool::new(1),
            Some(Arc::new(FixedShardCount(12))),
        );
        assert!(manager.total_shards().is_none());
        let _ = manager.start().await;
        assert_eq!(manager.total_shards(), Some(12));
    }

    #[tokio::test]
    async fn disconnect_closes_channel() {
        let h = harness(config(&[(1, None)]));
        let _ = h.manager.start().await;
        h.manager.connect_cluster(cid(1), false, false).await.unwrap();
        assert_eq!(h.manager.open_channels(), 1);
        let previous = h.manager.disconnect_cluster(cid(1)).unwrap();
        assert_eq!(previous, ConnectionStatus::Connected);
        assert_eq!(h.manager.open_channels(), 0);
        assert_eq!(h.manager.cluster(cid(1)).unwrap().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn stale_close_is_ignored() {
        let h = harness(config(&[(1, None)]));
        let _ = h.manager.start().await;
        h.manager.connect_cluster(cid(1), false, false).await.unwrap();
        h.manager.handle_channel_closed(cid(1), "conn_old", CloseReason::PeerClosed);
        assert_eq!(h.manager.cluster(cid(1)).unwrap().status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn current_close_marks_failed() {
        let h = harness(config(&[(1, None)]));
        let _ = h.manager.start().await;
        h.manager.connect_cluster(cid(1), false, false).await.unwrap();
        let conn = h.manager.connections.get(&cid(1)).map(|c| c.clone()).unwrap();
        h.manager.handle_channel_closed(cid(1), &conn, CloseReason::PeerClosed);
        assert_eq!(h.manager.cluster(cid(1)).unwrap().status, ConnectionStatus::Failed);
    }

    #[tokio::test]
    async fn resolve_requires_total() {
        let h = harness(ManagerConfig::default());
        assert_matches!(h.manager.resolve_shard(1), Err(SyncError::NotConfigured));
        assert_matches!(h.manager.resolve_cluster(1), Err(SyncError::NotConfigured));
    }

    #[tokio::test]
    async fn set_total_shards_guards_connected_intervals() {
        let h = harness(config(&[(1, Some((0, 10)))]));
        let _ = h.manager.start().await;
        h.manager.connect_cluster(cid(1), false, false).await.unwrap();
        assert_matches!(h.manager.set_total_shards(0), Err(SyncError::InvalidRange { .. }));
        assert_matches!(h.manager.set_total_shards(8), Err(SyncError::InvalidRange { .. }));
        h.manager.set_total_shards(10).unwrap();
        assert_eq!(h.manager.total_shards(), Some(10));
    }

    #[tokio::test]
    async fn interval_beyond_total_rejected() {
        let h = harness(config(&[(1, None)]));
        let _ = h.manager.start().await;
        assert_matches!(
            h.manager.set_shard_interval(cid(1), 10, 21),
            Err(SyncError::InvalidRange { .. })
        );
        let iv = h.manager.set_shard_interval(cid(1), 10, 20).unwrap();
        assert_eq!(iv.len(), 10);
    }

    #[tokio::test]
    async fn broadcast_with_no_active_clusters() {
        let h = harness(config(&[(1, None)]));
        let _ = h.manager.start().await;
        let report = h.manager.broadcast(&EventPayload::SupporterFetch).unwrap();
        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn config_from_settings() {
        let mut settings = SyncSettings::default();
        settings.coordinator.total_shards = Some(4);
        settings.clusters.push(shardsync_settings::ClusterSettings {
            id: 3,
            endpoint: "ws://c3".into(),
            auto_connect: false,
            shard_min: Some(0),
            shard_max: Some(4),
        });
        let cfg = ManagerConfig::from_settings(&settings).unwrap();
        assert_eq!(cfg.total_shards, Some(4));
        assert_eq!(cfg.clusters[0].shard_interval.map(ShardInterval::len), Some(4));
        assert!(!cfg.clusters[0].auto_connect);
        assert_eq!(cfg.sender_id.as_str(), "sync");
    }
}
