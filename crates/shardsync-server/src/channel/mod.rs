//! Connection layer: one persistent, framed, bidirectional channel per cluster.
//!
//! A [`Connector`] produces a [`RawLink`] (a pair of text queues) for a
//! cluster. [`ChannelPool`] wraps each link in a [`ClusterChannel`], runs a
//! read loop that decodes frames in arrival order and publishes
//! [`LinkEvent`]s for the service pump to consume.

pub mod connection;
pub mod connector;
pub mod memory;
pub mod pool;

pub use connection::ClusterChannel;
pub use connector::{Connector, RawLink, WsConnector};
pub use memory::{MemoryConnector, MemoryPeer};
pub use pool::ChannelPool;

use shardsync_core::{ClusterId, SyncFrame};

/// Why a channel's read loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the link or the transport broke.
    PeerClosed,
    /// Too many consecutive frames failed to decode.
    Unreadable,
    /// The coordinator closed the channel itself.
    Local,
}

impl CloseReason {
    /// Short label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::Unreadable => "unreadable",
            Self::Local => "local",
        }
    }
}

/// Event published by a channel read loop.
#[derive(Clone, Debug)]
pub enum LinkEvent {
    /// A decoded inbound frame.
    Frame {
        /// Cluster whose channel delivered the frame.
        cluster_id: ClusterId,
        /// Channel instance that delivered it.
        connection_id: String,
        /// The frame.
        frame: SyncFrame,
    },
    /// A channel ended without being closed locally.
    Closed {
        /// Cluster whose channel ended.
        cluster_id: ClusterId,
        /// Channel instance that ended.
        connection_id: String,
        /// Why it ended.
        reason: CloseReason,
    },
}
