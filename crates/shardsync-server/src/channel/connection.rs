//! Per-cluster channel state.

use std::sync::atomic::{AtomicU32, Ordering};

use metrics::counter;
use parking_lot::Mutex;
use shardsync_core::events::Handshake;
use shardsync_core::{ClusterId, Result, SyncError, SyncFrame};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::metrics::SYNC_FRAMES_DROPPED_TOTAL;

/// One live channel to a cluster.
pub struct ClusterChannel {
    cluster_id: ClusterId,
    /// Unique per open; distinguishes a channel from its replacement.
    connection_id: String,
    tx: mpsc::Sender<String>,
    /// Malformed frames received in a row.
    bad_frames: AtomicU32,
    handshake: Mutex<Option<oneshot::Sender<Handshake>>>,
    cancel: CancellationToken,
}

impl ClusterChannel {
    /// Wrap an outbound queue. Returns the channel and the receiver that
    /// resolves when the cluster's handshake arrives.
    pub fn new(cluster_id: ClusterId, tx: mpsc::Sender<String>) -> (Self, oneshot::Receiver<Handshake>) {
        let (handshake_tx, handshake_rx) = oneshot::channel();
        let channel = Self {
            cluster_id,
            connection_id: format!("conn_{}", uuid::Uuid::now_v7()),
            tx,
            bad_frames: AtomicU32::new(0),
            handshake: Mutex::new(Some(handshake_tx)),
            cancel: CancellationToken::new(),
        };
        (channel, handshake_rx)
    }

    /// Cluster this channel belongs to.
    pub fn cluster_id(&self) -> ClusterId {
        self.cluster_id
    }

    /// Unique id of this channel instance.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Queue a frame for the cluster.
    pub fn send(&self, frame: &SyncFrame) -> Result<()> {
        let text = frame.encode()?;
        self.send_text(text)
    }

    /// Queue a raw text message.
    ///
    /// Never waits: a full or closed queue drops the message and counts it in
    /// `sync_frames_dropped_total`.
    pub fn send_text(&self, text: String) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::ChannelClosed(self.cluster_id));
        }
        let err = match self.tx.try_send(text) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => SyncError::ChannelFull(self.cluster_id),
            Err(mpsc::error::TrySendError::Closed(_)) => SyncError::ChannelClosed(self.cluster_id),
        };
        counter!(SYNC_FRAMES_DROPPED_TOTAL, "cluster" => self.cluster_id.to_string()).increment(1);
        Err(err)
    }

    /// Record a malformed frame; returns the current run length.
    pub fn record_bad_frame(&self) -> u32 {
        self.bad_frames.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// A good frame arrived; reset the malformed run.
    pub fn reset_bad_frames(&self) {
        self.bad_frames.store(0, Ordering::Relaxed);
    }

    /// Deliver the handshake to whoever is waiting for it.
    ///
    /// Returns `false` if the handshake was already delivered or abandoned,
    /// or if it names another cluster.
    pub fn complete_handshake(&self, handshake: Handshake) -> bool {
        if handshake.cluster_id != self.cluster_id {
            return false;
        }
        match self.handshake.lock().take() {
            Some(tx) => tx.send(handshake).is_ok(),
            None => false,
        }
    }

    /// Drop the handshake slot so a waiter sees the channel is gone.
    pub fn abandon_handshake(&self) {
        let _ = self.handshake.lock().take();
    }

    /// Signal the read loop to stop.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled when the channel closes.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl std::fmt::Debug for ClusterChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterChannel")
            .field("cluster_id", &self.cluster_id)
            .field("connection_id", &self.connection_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
