//! Shared helpers for the coordinator integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shardsync_core::events::tags;
use shardsync_core::{ClusterId, ConnectionStatus, SyncFrame};
use shardsync_server::dispatch::handlers::StaticSupporters;
use shardsync_server::{ConnectionManager, MemoryConnector, MemoryPeer, SyncService};
use shardsync_settings::{ClusterSettings, SyncSettings};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Settings for `clusters` as `(id, Some((min, max)))`, all manual-connect.
pub fn settings(total_shards: Option<u32>, clusters: &[(u32, Option<(u32, u32)>)]) -> SyncSettings {
    let mut settings = SyncSettings::default();
    settings.coordinator.total_shards = total_shards;
    settings.coordinator.connect_timeout_ms = 1_000;
    settings.status.enabled = false;
    for (id, bounds) in clusters {
        settings.clusters.push(ClusterSettings {
            id: *id,
            endpoint: format!("mem://cluster-{id}"),
            auto_connect: false,
            shard_min: bounds.map(|b| b.0),
            shard_max: bounds.map(|b| b.1),
        });
    }
    settings
}

/// A service wired to an in-memory connector.
pub fn service(settings: &SyncSettings) -> (SyncService, MemoryConnector, mpsc::UnboundedReceiver<MemoryPeer>) {
    let (connector, peers) = MemoryConnector::new();
    let service = SyncService::with_sources(
        settings,
        Arc::new(connector.clone()),
        None,
        Arc::new(StaticSupporters::default()),
    )
    .unwrap();
    (service, connector, peers)
}

/// Fake worker fleet: answers every `CLUSTER_START` with a `HANDSHAKE` and
/// records every frame it receives.
pub struct Fleet {
    frames: Arc<Mutex<Vec<(ClusterId, SyncFrame)>>>,
    _task: JoinHandle<()>,
}

impl Fleet {
    /// Serve every peer the connector hands out.
    pub fn spawn(mut peers: mpsc::UnboundedReceiver<MemoryPeer>, server_count: Option<u64>) -> Self {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let task = tokio::spawn(async move {
            while let Some(mut peer) = peers.recv().await {
                let sink = Arc::clone(&sink);
                let _ = tokio::spawn(async move {
                    while let Some(frame) = peer.recv_frame().await {
                        let is_start = frame.event == tags::CLUSTER_START;
                        sink.lock().push((peer.cluster_id, frame));
                        if is_start && !peer.handshake(server_count).await {
                            break;
                        }
                    }
                });
            }
        });
        Self {
            frames,
            _task: task,
        }
    }

    /// Frames with tag `event` received by cluster `id` so far.
    pub fn frames(&self, id: u32, event: &str) -> Vec<SyncFrame> {
        self.frames
            .lock()
            .iter()
            .filter(|(cluster, frame)| cluster.get() == id && frame.event == event)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// Wait until cluster `id` has received `count` frames tagged `event`.
    pub async fn wait_for(&self, id: u32, event: &str, count: usize) -> Vec<SyncFrame> {
        for _ in 0..200 {
            let frames = self.frames(id, event);
            if frames.len() >= count {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.frames(id, event)
    }
}

/// Poll until cluster `id` reaches `status`, or give up after ~2s.
pub async fn wait_status(manager: &ConnectionManager, id: u32, status: ConnectionStatus) -> ConnectionStatus {
    let id = ClusterId::new(id);
    for _ in 0..200 {
        let current = manager.cluster(id).map(|c| c.status).unwrap();
        if current == status {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    manager.cluster(id).map(|c| c.status).unwrap()
}
