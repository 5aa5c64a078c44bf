//! Cluster records and the connection state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SyncError};
use crate::ids::ClusterId;

/// Connection state of a cluster as seen by the coordinator.
///
/// Legal moves:
///
/// ```text
/// Disconnected ──► Connecting ──► Connected
///      ▲   ▲           │  │           │
///      │   └───────────┘  ▼           │
///      └───────────── Failed ◄────────┘
/// ```
///
/// `Failed → Connecting` is also allowed (operator retry), and
/// `Disconnected → Disconnected` is an idempotent no-op.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No channel, not trying.
    #[default]
    Disconnected,
    /// Channel open or handshake in progress.
    Connecting,
    /// Channel live and handshake complete.
    Connected,
    /// Last connection attempt failed or the channel broke.
    Failed,
}

impl ConnectionStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionStatus::{Connected, Connecting, Disconnected, Failed};
        matches!(
            (self, next),
            (Disconnected | Failed, Connecting)
                | (Connecting, Connected | Failed | Disconnected)
                | (Connected, Failed | Disconnected)
                | (Failed | Disconnected, Disconnected)
        )
    }

    /// Wire / display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open range of shard indices `[min, max)` owned by one cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardInterval {
    min: u32,
    max: u32,
}

impl ShardInterval {
    /// Validate and build an interval. Rejects empty or inverted bounds.
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min >= max {
            return Err(SyncError::invalid_range(
                min,
                max,
                "min must be strictly below max",
            ));
        }
        Ok(Self { min, max })
    }

    /// Inclusive lower bound.
    pub fn min(self) -> u32 {
        self.min
    }

    /// Exclusive upper bound.
    pub fn max(self) -> u32 {
        self.max
    }

    /// Number of shards covered.
    pub fn len(self) -> u32 {
        self.max - self.min
    }

    /// Always false; empty intervals cannot be constructed.
    pub fn is_empty(self) -> bool {
        false
    }

    /// Whether `shard` falls inside the interval.
    pub fn contains(self, shard: u32) -> bool {
        self.min <= shard && shard < self.max
    }

    /// Whether the two intervals share at least one shard.
    pub fn overlaps(self, other: Self) -> bool {
        self.min < other.max && other.min < self.max
    }
}

impl fmt::Display for ShardInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.min, self.max)
    }
}

/// One worker process group handling a contiguous shard range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Unique id, assigned from configuration.
    pub id: ClusterId,
    /// Transport address for the sync channel.
    pub endpoint: String,
    /// Whether `start` connects this cluster automatically.
    pub auto_connect: bool,
    /// Owned shard range; `None` until assigned.
    pub shard_interval: Option<ShardInterval>,
    /// Current connection state.
    pub status: ConnectionStatus,
    /// Last reported server count.
    pub reported_load: Option<u64>,
}

impl Cluster {
    /// A disconnected cluster with no shards assigned.
    pub fn new(id: ClusterId, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            endpoint: endpoint.into(),
            auto_connect: false,
            shard_interval: None,
            status: ConnectionStatus::Disconnected,
            reported_load: None,
        }
    }

    /// Set the auto-connect flag.
    #[must_use]
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Pre-assign a shard interval.
    #[must_use]
    pub fn with_shard_interval(mut self, interval: ShardInterval) -> Self {
        self.shard_interval = Some(interval);
        self
    }

    /// Whether the cluster is connected.
    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}
