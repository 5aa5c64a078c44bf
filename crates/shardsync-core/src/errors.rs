//! Error taxonomy for the coordinator.
//!
//! [`SyncError`] covers every per-operation failure. Each variant maps to a
//! stable machine-readable code via [`SyncError::code`] so console output and
//! the status endpoint can report errors uniformly. [`FrameError`] covers
//! wire-level decode/encode failures, which are logged and dropped rather than
//! tearing a channel down.

use std::time::Duration;

use thiserror::Error;

use crate::cluster::ConnectionStatus;
use crate::ids::ClusterId;

/// Unknown cluster or unresolved shard owner.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Cluster id registered twice.
pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
/// Bad shard bounds or overlapping ownership.
pub const INVALID_RANGE: &str = "INVALID_RANGE";
/// Non-positive rate-limit interval.
pub const INVALID_INTERVAL: &str = "INVALID_INTERVAL";
/// Channel open failed.
pub const CONNECT_ERROR: &str = "CONNECT_ERROR";
/// Channel open or handshake did not finish in time.
pub const CONNECT_TIMEOUT: &str = "CONNECT_TIMEOUT";
/// Routing attempted before the shard total is known.
pub const NOT_CONFIGURED: &str = "NOT_CONFIGURED";
/// Two handlers registered for the same event tag.
pub const DUPLICATE_TAG: &str = "DUPLICATE_TAG";
/// Status change not allowed by the connection state machine.
pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";
/// No live channel, or the channel cannot accept more frames.
pub const CHANNEL_ERROR: &str = "CHANNEL_ERROR";
/// External data source failed.
pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
/// Malformed inbound or unencodable outbound frame.
pub const FRAME_ERROR: &str = "FRAME_ERROR";

/// Errors returned by registry, routing, channel and coordinator operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No cluster with this id is registered.
    #[error("cluster {0} not found")]
    ClusterNotFound(ClusterId),

    /// No connected cluster currently owns the shard.
    #[error("no connected cluster owns shard {shard}")]
    NoShardOwner {
        /// The resolved shard index.
        shard: u32,
    },

    /// A cluster with this id is already registered.
    #[error("cluster {0} is already registered")]
    ClusterExists(ClusterId),

    /// Shard bounds are inverted, empty, out of range or overlap another owner.
    #[error("invalid shard range [{min}, {max}): {reason}")]
    InvalidRange {
        /// Inclusive lower bound.
        min: u32,
        /// Exclusive upper bound.
        max: u32,
        /// Why the range was rejected.
        reason: String,
    },

    /// Rate-limit interval must be strictly positive.
    #[error("invalid rate-limit interval {0}ns, must be positive")]
    InvalidInterval(i64),

    /// Opening the channel to a cluster failed.
    #[error("failed to connect to cluster {cluster}: {message}")]
    Connect {
        /// Target cluster.
        cluster: ClusterId,
        /// Transport-level detail.
        message: String,
    },

    /// Channel open or initial handshake exceeded the connect timeout.
    #[error("cluster {cluster} did not connect within {timeout:?}")]
    ConnectTimeout {
        /// Target cluster.
        cluster: ClusterId,
        /// The bound that elapsed.
        timeout: Duration,
    },

    /// `total_shards` has not been configured yet.
    #[error("total shard count is not configured")]
    NotConfigured,

    /// A handler for this event tag is already registered.
    #[error("event handler for '{0}' is already registered")]
    DuplicateTag(String),

    /// The requested status change is not a legal transition.
    #[error("cluster {cluster} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Cluster being updated.
        cluster: ClusterId,
        /// Current status.
        from: ConnectionStatus,
        /// Requested status.
        to: ConnectionStatus,
    },

    /// There is no open channel to the cluster, or it was closed under us.
    #[error("no open channel to cluster {0}")]
    ChannelClosed(ClusterId),

    /// The channel's outbound queue is full; the frame was dropped.
    #[error("outbound queue for cluster {0} is full")]
    ChannelFull(ClusterId),

    /// An external data source (shard-count API, supporter source) failed.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Wire frame could not be decoded or encoded.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl SyncError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClusterNotFound(_) | Self::NoShardOwner { .. } => NOT_FOUND,
            Self::ClusterExists(_) => ALREADY_EXISTS,
            Self::InvalidRange { .. } => INVALID_RANGE,
            Self::InvalidInterval(_) => INVALID_INTERVAL,
            Self::Connect { .. } => CONNECT_ERROR,
            Self::ConnectTimeout { .. } => CONNECT_TIMEOUT,
            Self::NotConfigured => NOT_CONFIGURED,
            Self::DuplicateTag(_) => DUPLICATE_TAG,
            Self::InvalidTransition { .. } => INVALID_TRANSITION,
            Self::ChannelClosed(_) | Self::ChannelFull(_) => CHANNEL_ERROR,
            Self::Upstream(_) => UPSTREAM_ERROR,
            Self::Frame(_) => FRAME_ERROR,
        }
    }

    /// Shorthand for an [`SyncError::InvalidRange`].
    pub fn invalid_range(min: u32, max: u32, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            min,
            max,
            reason: reason.into(),
        }
    }

    /// Whether this is one of the "not found" variants.
    pub fn is_not_found(&self) -> bool {
        self.code() == NOT_FOUND
    }
}

/// Wire-level frame failures.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The text was not a valid frame record.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame carried an empty event tag.
    #[error("frame has an empty event tag")]
    MissingEvent,

    /// The `data` field did not match the schema for its tag.
    #[error("invalid payload for '{event}': {message}")]
    InvalidPayload {
        /// Event tag whose schema failed.
        event: String,
        /// Decoder detail.
        message: String,
    },

    /// An outbound frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, SyncError>;
