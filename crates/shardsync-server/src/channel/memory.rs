//! In-process connector.
//!
//! Each successful connect hands a [`MemoryPeer`] (the cluster's end of the
//! link) to whoever holds the peer receiver. Used when embedding the
//! coordinator next to its clusters and throughout the tests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shardsync_core::events::{EventPayload, Handshake};
use shardsync_core::{Cluster, ClusterId, Result, SenderId, SyncError, SyncFrame};
use tokio::sync::mpsc;

use super::connector::{Connector, RawLink};

/// Links clusters over in-memory queues.
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refused: Arc<Mutex<HashSet<ClusterId>>>,
    buffer: usize,
}

impl MemoryConnector {
    /// Create a connector and the receiver that yields each connected peer.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        Self::with_buffer(64)
    }

    /// Same as [`new`](Self::new) with a custom queue depth.
    pub fn with_buffer(buffer: usize) -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers,
            refused: Arc::new(Mutex::new(HashSet::new())),
            buffer: buffer.max(1),
        };
        (connector, rx)
    }

    /// Make connects to `id` fail until [`allow`](Self::allow) is called.
    pub fn refuse(&self, id: ClusterId) {
        let _ = self.refused.lock().insert(id);
    }

    /// Undo [`refuse`](Self::refuse).
    pub fn allow(&self, id: ClusterId) {
        let _ = self.refused.lock().remove(&id);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, cluster: &Cluster) -> Result<RawLink> {
        if self.refused.lock().contains(&cluster.id) {
            return Err(SyncError::Connect {
                cluster: cluster.id,
                message: "connection refused".to_string(),
            });
        }

        let (to_cluster, from_coordinator) = mpsc::channel(self.buffer);
        let (to_coordinator, from_cluster) = mpsc::channel(self.buffer);
        let peer = MemoryPeer {
            cluster_id: cluster.id,
            to_coordinator,
            from_coordinator,
        };
        self.peers.send(peer).map_err(|_| SyncError::Connect {
            cluster: cluster.id,
            message: "no listener for in-memory peers".to_string(),
        })?;

        Ok(RawLink {
            outbound: to_cluster,
            inbound: from_cluster,
        })
    }
}

/// The cluster's end of an in-memory link.
#[derive(Debug)]
pub struct MemoryPeer {
    /// Cluster this peer plays.
    pub cluster_id: ClusterId,
    /// Text sent to the coordinator. Dropping it closes the link.
    pub to_coordinator: mpsc::Sender<String>,
    /// Text received from the coordinator.
    pub from_coordinator: mpsc::Receiver<String>,
}

impl MemoryPeer {
    /// Sender id this peer uses.
    pub fn sender_id(&self) -> SenderId {
        SenderId::cluster(self.cluster_id)
    }

    /// Next decodable frame from the coordinator, or `None` once closed.
    pub async fn recv_frame(&mut self) -> Option<SyncFrame> {
        while let Some(text) = self.from_coordinator.recv().await {
            if let Ok(frame) = SyncFrame::decode(&text) {
                return Some(frame);
            }
        }
        None
    }

    /// Send a frame; `false` if the coordinator end is gone.
    pub async fn send_frame(&self, frame: &SyncFrame) -> bool {
        match frame.encode() {
            Ok(text) => self.send_raw(text).await,
            Err(_) => false,
        }
    }

    /// Send a typed payload as this cluster.
    pub async fn send_payload(&self, payload: &EventPayload) -> bool {
        match SyncFrame::from_payload(self.sender_id(), payload) {
            Ok(frame) => self.send_frame(&frame).await,
            Err(_) => false,
        }
    }

    /// Send raw text, malformed or not.
    pub async fn send_raw(&self, text: impl Into<String>) -> bool {
        self.to_coordinator.send(text.into()).await.is_ok()
    }

    /// Announce this cluster with a `HANDSHAKE`.
    pub async fn handshake(&self, server_count: Option<u64>) -> bool {
        self.send_payload(&EventPayload::Handshake(Handshake {
            cluster_id: self.cluster_id,
            server_count,
        }))
        .await
    }
}
