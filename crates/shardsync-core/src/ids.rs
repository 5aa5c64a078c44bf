//! Identifier newtypes.
//!
//! [`ClusterId`] is assigned externally (from configuration), never generated
//! here. [`SenderId`] is the role-prefixed identity carried by every frame:
//! clusters send as `cluster_<id>`, the coordinator as its configured id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prefix marking a cluster-originated sender id.
pub const CLUSTER_PREFIX: &str = "cluster_";

/// Default sender id used by the coordinator itself.
pub const COORDINATOR_SENDER: &str = "sync";

/// Numeric identity of one worker cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(u32);

impl ClusterId {
    /// Wrap a raw cluster number.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw cluster number.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ClusterId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl FromStr for ClusterId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Role encoded in a [`SenderId`] prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SenderRole {
    /// A worker cluster (`cluster_<id>`).
    Cluster(ClusterId),
    /// Anything else (the coordinator, dashboards, tooling).
    Other,
}

/// Role-prefixed identity of a frame's sender.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
    /// Sender id for the given cluster.
    #[must_use]
    pub fn cluster(id: ClusterId) -> Self {
        Self(format!("{CLUSTER_PREFIX}{id}"))
    }

    /// Create from an arbitrary string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Decode the role from the prefix.
    ///
    /// A `cluster_` prefix followed by anything but a number is not a cluster.
    pub fn role(&self) -> SenderRole {
        self.0
            .strip_prefix(CLUSTER_PREFIX)
            .and_then(|rest| rest.parse().ok())
            .map_or(SenderRole::Other, SenderRole::Cluster)
    }

    /// The cluster id when this sender is a cluster.
    pub fn cluster_id(&self) -> Option<ClusterId> {
        match self.role() {
            SenderRole::Cluster(id) => Some(id),
            SenderRole::Other => None,
        }
    }

    /// Whether this sender carries the cluster prefix.
    pub fn is_cluster(&self) -> bool {
        self.cluster_id().is_some()
    }

    /// Return the inner string as a slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SenderId {
    fn default() -> Self {
        Self(COORDINATOR_SENDER.to_owned())
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SenderId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
