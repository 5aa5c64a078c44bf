//! Open channels, indexed by cluster.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::{counter, gauge};
use shardsync_core::events::{EventPayload, Handshake, tags};
use shardsync_core::{Cluster, ClusterId, Result, SyncError, SyncFrame};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::connection::ClusterChannel;
use super::connector::Connector;
use super::{CloseReason, LinkEvent};
use crate::metrics::{SYNC_CHANNELS_OPEN, SYNC_FRAMES_MALFORMED_TOTAL};

/// Owns every open channel and the read loop behind each.
pub struct ChannelPool {
    connector: Arc<dyn Connector>,
    channels: Arc<DashMap<ClusterId, Arc<ClusterChannel>>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    max_bad_frames: u32,
}

impl ChannelPool {
    /// Create a pool. Link events are delivered on the returned receiver.
    pub fn new(
        connector: Arc<dyn Connector>,
        max_bad_frames: u32,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let pool = Self {
            connector,
            channels: Arc::new(DashMap::new()),
            events,
            max_bad_frames: max_bad_frames.max(1),
        };
        (pool, rx)
    }

    /// Open a channel to `cluster`, replacing any existing one.
    ///
    /// Returns the channel and a receiver for the cluster's handshake.
    pub async fn open(
        &self,
        cluster: &Cluster,
    ) -> Result<(Arc<ClusterChannel>, oneshot::Receiver<Handshake>)> {
        if self.close(cluster.id) {
            debug!(cluster_id = %cluster.id, "replaced existing channel");
        }

        let link = self.connector.connect(cluster).await?;
        let (channel, handshake) = ClusterChannel::new(cluster.id, link.outbound);
        let channel = Arc::new(channel);
        let _ = self.channels.insert(cluster.id, Arc::clone(&channel));
        gauge!(SYNC_CHANNELS_OPEN).increment(1.0);
        info!(
            cluster_id = %cluster.id,
            connection_id = channel.connection_id(),
            "channel opened"
        );

        let _reader = tokio::spawn(read_loop(
            Arc::clone(&channel),
            link.inbound,
            Arc::clone(&self.channels),
            self.events.clone(),
            self.max_bad_frames,
        ));
        Ok((channel, handshake))
    }

    /// Send a frame to one cluster.
    pub fn send(&self, id: ClusterId, frame: &SyncFrame) -> Result<()> {
        let channel = self
            .channels
            .get(&id)
            .map(|c| Arc::clone(c.value()))
            .ok_or(SyncError::ChannelClosed(id))?;
        channel.send(frame)
    }

    /// Close the channel to `id`. Returns whether one was open.
    ///
    /// A local close publishes no [`LinkEvent::Closed`].
    pub fn close(&self, id: ClusterId) -> bool {
        match self.channels.remove(&id) {
            Some((_, channel)) => {
                channel.close();
                debug!(cluster_id = %id, connection_id = channel.connection_id(), "channel closed locally");
                true
            }
            None => false,
        }
    }

    /// Close every channel.
    pub fn close_all(&self) {
        let ids: Vec<ClusterId> = self.channels.iter().map(|e| *e.key()).collect();
        for id in ids {
            let _ = self.close(id);
        }
    }

    /// Number of open channels.
    pub fn open_count(&self) -> usize {
        self.channels.len()
    }
}

/// Decode inbound text in arrival order until the channel ends.
async fn read_loop(
    channel: Arc<ClusterChannel>,
    mut inbound: mpsc::Receiver<String>,
    channels: Arc<DashMap<ClusterId, Arc<ClusterChannel>>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    max_bad_frames: u32,
) {
    let cluster_id = channel.cluster_id();
    let connection_id = channel.connection_id().to_owned();
    let cancel = channel.cancel_token();

    let reason = loop {
        let text = tokio::select! {
            biased;
            () = cancel.cancelled() => break CloseReason::Local,
            text = inbound.recv() => text,
        };
        let Some(text) = text else {
            break CloseReason::PeerClosed;
        };

        match SyncFrame::decode(&text) {
            Ok(frame) => {
                channel.reset_bad_frames();
                if frame.event == tags::HANDSHAKE {
                    if let Ok(EventPayload::Handshake(handshake)) = frame.payload() {
                        let _ = channel.complete_handshake(handshake);
                    }
                }
                let _ = events.send(LinkEvent::Frame {
                    cluster_id,
                    connection_id: connection_id.clone(),
                    frame,
                });
            }
            Err(e) => {
                let run = channel.record_bad_frame();
                counter!(SYNC_FRAMES_MALFORMED_TOTAL, "cluster" => cluster_id.to_string())
                    .increment(1);
                warn!(%cluster_id, %connection_id, error = %e, run, "dropping malformed frame");
                if run >= max_bad_frames {
                    break CloseReason::Unreadable;
                }
            }
        }
    };

    // Only remove our own entry; a replacement may already be registered.
    let _ = channels.remove_if(&cluster_id, |_, c| c.connection_id() == connection_id);
    channel.close();
    channel.abandon_handshake();
    gauge!(SYNC_CHANNELS_OPEN).decrement(1.0);

    if reason == CloseReason::Local {
        debug!(%cluster_id, %connection_id, "read loop stopped");
    } else {
        warn!(%cluster_id, %connection_id, reason = reason.as_str(), "channel lost");
        let _ = events.send(LinkEvent::Closed {
            cluster_id,
            connection_id,
            reason,
        });
    }
}
