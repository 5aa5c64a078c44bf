//! Settings type definitions.
//!
//! Keys are `snake_case` so that `SHARDSYNC_*` environment variables map onto
//! them directly. Every section implements [`Default`] with production
//! values and is marked `#[serde(default)]`, so a settings file only needs the
//! keys it overrides.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the coordinator.
///
/// ```json
/// {
///   "coordinator": { "total_shards": 20 },
///   "clusters": [
///     { "id": 1, "endpoint": "ws://10.0.0.1:7001", "shard_min": 0, "shard_max": 10 }
///   ]
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Coordinator runtime behavior.
    pub coordinator: CoordinatorSettings,
    /// Status HTTP endpoint.
    pub status: StatusSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Recommended shard count source.
    pub shards: ShardSettings,
    /// Static supporter tiers served to clusters.
    pub supporters: SupporterSettings,
    /// Known clusters, registered on start.
    pub clusters: Vec<ClusterSettings>,
}

impl SyncSettings {
    /// Reject settings the coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate()?;
        let total = self.coordinator.total_shards;

        let mut seen = HashSet::new();
        for cluster in &self.clusters {
            if !seen.insert(cluster.id) {
                return Err(invalid(format!("cluster {} is listed twice", cluster.id)));
            }
            if cluster.endpoint.trim().is_empty() {
                return Err(invalid(format!("cluster {} has no endpoint", cluster.id)));
            }
            match (cluster.shard_min, cluster.shard_max) {
                (None, None) => {}
                (Some(min), Some(max)) => {
                    if min >= max {
                        return Err(invalid(format!(
                            "cluster {}: shard_min {min} must be below shard_max {max}",
                            cluster.id
                        )));
                    }
                    if let Some(total) = total {
                        if max > total {
                            return Err(invalid(format!(
                                "cluster {}: shard_max {max} exceeds total_shards {total}",
                                cluster.id
                            )));
                        }
                    }
                }
                _ => {
                    return Err(invalid(format!(
                        "cluster {}: shard_min and shard_max must be set together",
                        cluster.id
                    )));
                }
            }
        }

        if self.shards.refresh_minutes == 0 {
            return Err(invalid("shards.refresh_minutes must be positive"));
        }
        if self.shards.fallback == 0 {
            return Err(invalid("shards.fallback must be positive"));
        }
        for key in self.supporters.tiers.keys() {
            if key.parse::<u64>().is_err() {
                return Err(invalid(format!("supporter id '{key}' is not numeric")));
            }
        }
        Ok(())
    }
}

/// Coordinator runtime behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Sender id the coordinator stamps on outbound frames.
    pub sender_id: String,
    /// Fleet-wide shard total. Resolved from the shard source when unset.
    pub total_shards: Option<u32>,
    /// Bound on channel open and on the initial handshake.
    pub connect_timeout_ms: u64,
    /// Maximum concurrently running background tasks.
    pub worker_pool_size: usize,
    /// Outbound queue depth per channel.
    pub channel_buffer: usize,
    /// Malformed frames in a row that tear a channel down.
    pub max_consecutive_bad_frames: u32,
    /// Initial shared rate-limit interval.
    pub ratelimit_interval_nanos: i64,
    /// Run `start` immediately at boot.
    pub autostart: bool,
    /// Wait for the cluster's handshake on auto-connect.
    pub expect_handshake: bool,
    /// Grace period for shutdown before tasks are abandoned.
    pub shutdown_timeout_ms: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            sender_id: "sync".to_string(),
            total_shards: None,
            connect_timeout_ms: 10_000,
            worker_pool_size: 16,
            channel_buffer: 256,
            max_consecutive_bad_frames: 5,
            ratelimit_interval_nanos: 20_000_000,
            autostart: false,
            expect_handshake: true,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl CoordinatorSettings {
    fn validate(&self) -> Result<()> {
        if self.sender_id.trim().is_empty() {
            return Err(invalid("coordinator.sender_id must not be empty"));
        }
        if self.total_shards == Some(0) {
            return Err(invalid("coordinator.total_shards must be positive"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("coordinator.connect_timeout_ms must be positive"));
        }
        if self.worker_pool_size == 0 {
            return Err(invalid("coordinator.worker_pool_size must be positive"));
        }
        if self.channel_buffer == 0 {
            return Err(invalid("coordinator.channel_buffer must be positive"));
        }
        if self.max_consecutive_bad_frames == 0 {
            return Err(invalid(
                "coordinator.max_consecutive_bad_frames must be positive",
            ));
        }
        if self.ratelimit_interval_nanos <= 0 {
            return Err(invalid(
                "coordinator.ratelimit_interval_nanos must be positive",
            ));
        }
        Ok(())
    }
}

/// Status HTTP endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    /// Serve `/health`, `/clusters` and `/metrics`.
    pub enabled: bool,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 9464,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit one JSON object per line.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Recommended shard count source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardSettings {
    /// Base URL of the upstream gateway API.
    pub api_base: String,
    /// Bot token. Without it the fallback count is used.
    pub bot_token: Option<String>,
    /// How long a fetched count stays fresh.
    pub refresh_minutes: u64,
    /// Count used when no token is configured.
    pub fallback: u32,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
}

impl Default for ShardSettings {
    fn default() -> Self {
        Self {
            api_base: "https://discord.com/api/v10".to_string(),
            bot_token: None,
            refresh_minutes: 60,
            fallback: 1,
            request_timeout_ms: 10_000,
        }
    }
}

/// Static supporter tiers, keyed by user id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupporterSettings {
    /// Tier per user id. Keys are numeric strings.
    pub tiers: BTreeMap<String, u32>,
}

/// One configured cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Cluster id.
    pub id: u32,
    /// WebSocket URL the coordinator dials.
    pub endpoint: String,
    /// Connect on `start`.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    /// Inclusive lower shard bound.
    #[serde(default)]
    pub shard_min: Option<u32>,
    /// Exclusive upper shard bound.
    #[serde(default)]
    pub shard_max: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn invalid(message: impl Into<String>) -> SettingsError {
    SettingsError::InvalidValue(message.into())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
