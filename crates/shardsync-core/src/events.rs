//! Typed event payloads.
//!
//! Frames arrive with an untyped `data` value. [`EventPayload::decode`]
//! validates it against the schema for its tag at the dispatch boundary, so
//! handlers only ever see typed bodies. Unknown tags are carried through as
//! [`EventPayload::Opaque`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FrameError;
use crate::ids::ClusterId;

/// Event tag constants.
pub mod tags {
    /// First frame a cluster sends after connecting.
    pub const HANDSHAKE: &str = "HANDSHAKE";
    /// Coordinator tells a cluster to start its shard range.
    pub const CLUSTER_START: &str = "CLUSTER_START";
    /// Cluster reports how many servers it handles.
    pub const SERVER_COUNT: &str = "SERVER_COUNT";
    /// Coordinator pushes the shared rate-limit interval.
    pub const SYNCED_RATELIMIT: &str = "SYNCED_RATELIMIT";
    /// Cluster asks for the current rate-limit interval.
    pub const RATELIMIT_FETCH: &str = "RATELIMIT_FETCH";
    /// Cluster asks which shard and cluster own a server.
    pub const SERVER_ROUTE: &str = "SERVER_ROUTE";
    /// Answer to [`SERVER_ROUTE`].
    pub const SERVER_ROUTE_RESULT: &str = "SERVER_ROUTE_RESULT";
    /// Cluster asks the coordinator to refresh supporter tiers.
    pub const SUPPORTER_FETCH: &str = "SUPPORTER_FETCH";
    /// Coordinator pushes supporter tiers to every cluster.
    pub const SUPPORTERS: &str = "SUPPORTERS";
}

/// Body of `HANDSHAKE`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Cluster announcing itself.
    pub cluster_id: ClusterId,
    /// Server count at connect time, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_count: Option<u64>,
}

/// Body of `CLUSTER_START`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStart {
    /// Cluster being started.
    pub cluster_id: ClusterId,
    /// Fleet-wide shard total, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_shards: Option<u32>,
    /// Inclusive lower shard bound, if assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_min: Option<u32>,
    /// Exclusive upper shard bound, if assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_max: Option<u32>,
    /// Whether this start follows a previous connection.
    #[serde(default)]
    pub reconnect: bool,
}

/// Body of `SERVER_COUNT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCount {
    /// Number of servers the cluster currently handles.
    pub server_count: u64,
}

/// Body of `SYNCED_RATELIMIT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedRatelimit {
    /// Shared interval in nanoseconds.
    pub interval_time_nanos: i64,
}

/// Body of `SERVER_ROUTE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRoute {
    /// Entity id to resolve.
    pub server_id: u64,
}

/// Body of `SERVER_ROUTE_RESULT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRouteResult {
    /// Entity id that was resolved.
    pub server_id: u64,
    /// Shard it maps to.
    pub shard: u32,
    /// Connected owner, absent when no cluster owns the shard.
    pub cluster_id: Option<ClusterId>,
}

/// Body of `SUPPORTERS`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supporters {
    /// Tier per user id.
    pub tiers: BTreeMap<u64, u32>,
}

/// A decoded event body, keyed by tag.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// `HANDSHAKE`
    Handshake(Handshake),
    /// `CLUSTER_START`
    ClusterStart(ClusterStart),
    /// `SERVER_COUNT`
    ServerCount(ServerCount),
    /// `SYNCED_RATELIMIT`
    SyncedRatelimit(SyncedRatelimit),
    /// `RATELIMIT_FETCH`
    RatelimitFetch,
    /// `SERVER_ROUTE`
    ServerRoute(ServerRoute),
    /// `SERVER_ROUTE_RESULT`
    ServerRouteResult(ServerRouteResult),
    /// `SUPPORTER_FETCH`
    SupporterFetch,
    /// `SUPPORTERS`
    Supporters(Supporters),
    /// Any tag without a typed schema.
    Opaque {
        /// The original tag.
        event: String,
        /// The untouched body.
        data: Value,
    },
}

impl EventPayload {
    /// Validate `data` against the schema registered for `event`.
    pub fn decode(event: &str, data: Value) -> Result<Self, FrameError> {
        Ok(match event {
            tags::HANDSHAKE => Self::Handshake(typed(event, data)?),
            tags::CLUSTER_START => Self::ClusterStart(typed(event, data)?),
            tags::SERVER_COUNT => Self::ServerCount(typed(event, data)?),
            tags::SYNCED_RATELIMIT => Self::SyncedRatelimit(typed(event, data)?),
            tags::RATELIMIT_FETCH => Self::RatelimitFetch,
            tags::SERVER_ROUTE => Self::ServerRoute(typed(event, data)?),
            tags::SERVER_ROUTE_RESULT => Self::ServerRouteResult(typed(event, data)?),
            tags::SUPPORTER_FETCH => Self::SupporterFetch,
            tags::SUPPORTERS => Self::Supporters(typed(event, data)?),
            _ => Self::Opaque {
                event: event.to_owned(),
                data,
            },
        })
    }

    /// The event tag this payload travels under.
    pub fn event(&self) -> &str {
        match self {
            Self::Handshake(_) => tags::HANDSHAKE,
            Self::ClusterStart(_) => tags::CLUSTER_START,
            Self::ServerCount(_) => tags::SERVER_COUNT,
            Self::SyncedRatelimit(_) => tags::SYNCED_RATELIMIT,
            Self::RatelimitFetch => tags::RATELIMIT_FETCH,
            Self::ServerRoute(_) => tags::SERVER_ROUTE,
            Self::ServerRouteResult(_) => tags::SERVER_ROUTE_RESULT,
            Self::SupporterFetch => tags::SUPPORTER_FETCH,
            Self::Supporters(_) => tags::SUPPORTERS,
            Self::Opaque { event, .. } => event,
        }
    }

    /// Serialize the body back to a JSON value.
    pub fn to_data(&self) -> Result<Value, FrameError> {
        let encoded = match self {
            Self::Handshake(p) => serde_json::to_value(p),
            Self::ClusterStart(p) => serde_json::to_value(p),
            Self::ServerCount(p) => serde_json::to_value(p),
            Self::SyncedRatelimit(p) => serde_json::to_value(p),
            Self::ServerRoute(p) => serde_json::to_value(p),
            Self::ServerRouteResult(p) => serde_json::to_value(p),
            Self::Supporters(p) => serde_json::to_value(p),
            Self::RatelimitFetch | Self::SupporterFetch => Ok(Value::Null),
            Self::Opaque { data, .. } => Ok(data.clone()),
        };
        encoded.map_err(|e| FrameError::Encode(e.to_string()))
    }
}

fn typed<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, FrameError> {
    serde_json::from_value(data).map_err(|e| FrameError::InvalidPayload {
        event: event.to_owned(),
        message: e.to_string(),
    })
}
