//! Recommended shard count.
//!
//! When `total_shards` is not configured, the coordinator asks the upstream
//! gateway how many shards the bot should run. The answer is cached and
//! refreshed on a timer; a failed refresh keeps serving the last good value.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use shardsync_core::{Result, SyncError};
use shardsync_settings::ShardSettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Anything that can report the fleet-wide shard total.
#[async_trait]
pub trait ShardCountSource: Send + Sync {
    /// Current shard total.
    async fn total_shards(&self) -> Result<u32>;
}

/// A fixed shard total.
#[derive(Clone, Copy, Debug)]
pub struct FixedShardCount(pub u32);

#[async_trait]
impl ShardCountSource for FixedShardCount {
    async fn total_shards(&self) -> Result<u32> {
        Ok(self.0)
    }
}

#[derive(Debug, Deserialize)]
struct GatewayBot {
    shards: u32,
}

#[derive(Clone, Copy, Debug)]
struct Cached {
    shards: u32,
    fetched_at: Instant,
}

/// Cached recommended shard count from `GET {api_base}/gateway/bot`.
pub struct RecommendedShardsCache {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
    ttl: Duration,
    fallback: u32,
    cached: Mutex<Option<Cached>>,
}

impl RecommendedShardsCache {
    /// Build from settings.
    pub fn new(settings: &ShardSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| SyncError::Upstream(e.to_string()))?;
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            token: settings.bot_token.clone().filter(|t| !t.is_empty()),
            ttl: Duration::from_secs(settings.refresh_minutes.saturating_mul(60)),
            fallback: settings.fallback.max(1),
            cached: Mutex::new(None),
        })
    }

    /// Last fetched value, fresh or not.
    pub fn cached(&self) -> Option<u32> {
        self.cached.lock().map(|c| c.shards)
    }

    /// Cached value if fresh, otherwise a new fetch.
    ///
    /// Without a token the fallback is returned and nothing is fetched. A
    /// failed fetch falls back to the stale value when there is one.
    pub async fn get(&self) -> Result<u32> {
        if self.token.is_none() {
            return Ok(self.fallback);
        }
        if let Some(cached) = *self.cached.lock() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.shards);
            }
        }
        self.refresh().await
    }

    /// Fetch now, ignoring freshness.
    pub async fn refresh(&self) -> Result<u32> {
        let Some(token) = self.token.as_deref() else {
            return Ok(self.fallback);
        };
        match self.fetch(token).await {
            Ok(shards) => {
                *self.cached.lock() = Some(Cached {
                    shards,
                    fetched_at: Instant::now(),
                });
                debug!(shards, "recommended shard count refreshed");
                Ok(shards)
            }
            Err(e) => match self.cached() {
                Some(stale) => {
                    warn!(error = %e, stale, "shard count refresh failed, keeping cached value");
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    async fn fetch(&self, token: &str) -> Result<u32> {
        let url = format!("{}/gateway/bot", self.api_base);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {token}"))
            .send()
            .await
            .map_err(|e| SyncError::Upstream(e.to_string()))?
            .error_for_status()
            .map_err(|e| SyncError::Upstream(e.to_string()))?;
        let body: GatewayBot = response
            .json()
            .await
            .map_err(|e| SyncError::Upstream(e.to_string()))?;
        if body.shards == 0 {
            return Err(SyncError::Upstream("gateway recommended 0 shards".to_string()));
        }
        Ok(body.shards)
    }

    /// Refresh every TTL until `cancel` fires.
    pub fn spawn_refresh(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            if cache.token.is_none() {
                debug!("no bot token, shard refresh loop not needed");
                return;
            }
            let mut interval = tokio::time::interval(cache.ttl);
            // Skip the immediate first tick
            let _ = interval.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = cache.refresh().await {
                            warn!(error = %e, "shard count refresh failed");
                        }
                    }
                }
            }
            info!("shard refresh loop stopped");
        })
    }
}

#[async_trait]
impl ShardCountSource for RecommendedShardsCache {
    async fn total_shards(&self) -> Result<u32> {
        self.get().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(api_base: &str, token: Option<&str>) -> ShardSettings {
        ShardSettings {
            api_base: api_base.to_string(),
            bot_token: token.map(str::to_string),
            refresh_minutes: 60,
            fallback: 1,
            request_timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn no_token_returns_fallback() {
        let cache = RecommendedShardsCache::new(&settings("http://unused", None)).unwrap();
        assert_eq!(cache.get().await.unwrap(), 1);
        assert!(cache.cached().is_none());
    }

    #[tokio::test]
    async fn fetches_with_bot_authorization_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway/bot"))
            .and(header("Authorization", "Bot secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "wss://gateway.example",
                "shards": 24
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cache = RecommendedShardsCache::new(&settings(&server.uri(), Some("secret"))).unwrap();
        assert_eq!(cache.get().await.unwrap(), 24);
        // Served from cache; the mock expects exactly one call.
        assert_eq!(cache.get().await.unwrap(), 24);
        assert_eq!(cache.cached(), Some(24));
    }

    #[tokio::test]
    async fn failure_without_cache_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway/bot"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let cache = RecommendedShardsCache::new(&settings(&server.uri(), Some("bad"))).unwrap();
        assert_matches!(cache.get().await, Err(SyncError::Upstream(_)));
    }

    #[tokio::test]
    async fn failed_refresh_serves_stale_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway/bot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"shards": 8})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gateway/bot"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = RecommendedShardsCache::new(&settings(&server.uri(), Some("t"))).unwrap();
        assert_eq!(cache.refresh().await.unwrap(), 8);
        assert_eq!(cache.refresh().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn zero_shards_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway/bot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"shards": 0})))
            .mount(&server)
            .await;

        let cache = RecommendedShardsCache::new(&settings(&server.uri(), Some("t"))).unwrap();
        assert_matches!(cache.get().await, Err(SyncError::Upstream(_)));
    }

    #[tokio::test]
    async fn refresh_loop_stops_on_cancel() {
        let cache = Arc::new(RecommendedShardsCache::new(&settings("http://unused", Some("t"))).unwrap());
        let cancel = CancellationToken::new();
        let handle = cache.spawn_refresh(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn fixed_source() {
        assert_eq!(FixedShardCount(16).total_shards().await.unwrap(), 16);
    }
}
