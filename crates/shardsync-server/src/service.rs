//! `SyncService`: builds the context and the handler registry, and pumps
//! link events into dispatches and status changes.

use std::sync::Arc;

use parking_lot::Mutex;
use shardsync_core::Result;
use shardsync_settings::SyncSettings;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{Connector, LinkEvent};
use crate::context::SyncContext;
use crate::dispatch::handlers::{self, StaticSupporters, SupporterSource};
use crate::dispatch::{DispatchOutcome, EventRegistry, InboundMessage};
use crate::manager::{ConnectionManager, ManagerConfig};
use crate::pool::WorkerPool;
use crate::ratelimit::RatelimitCoordinator;
use crate::shards::{RecommendedShardsCache, ShardCountSource};

/// The assembled coordinator.
pub struct SyncService {
    ctx: Arc<SyncContext>,
    registry: Arc<EventRegistry>,
    shards: Option<Arc<RecommendedShardsCache>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<LinkEvent>>>,
}

impl SyncService {
    /// Build from settings.
    ///
    /// Without a configured `total_shards` the recommended count is fetched
    /// from the gateway on start. Supporter tiers come from settings.
    pub fn new(settings: &SyncSettings, connector: Arc<dyn Connector>) -> Result<Self> {
        let shards = if settings.coordinator.total_shards.is_none() {
            Some(Arc::new(RecommendedShardsCache::new(&settings.shards)?))
        } else {
            None
        };
        let source = shards
            .as_ref()
            .map(|cache| Arc::clone(cache) as Arc<dyn ShardCountSource>);
        let supporters = Arc::new(StaticSupporters::from_settings(&settings.supporters));
        let mut service = Self::with_sources(settings, connector, source, supporters)?;
        service.shards = shards;
        Ok(service)
    }

    /// Build with explicit shard-count and supporter sources.
    pub fn with_sources(
        settings: &SyncSettings,
        connector: Arc<dyn Connector>,
        shard_source: Option<Arc<dyn ShardCountSource>>,
        supporters: Arc<dyn SupporterSource>,
    ) -> Result<Self> {
        let config = ManagerConfig::from_settings(settings)?;
        let pool = WorkerPool::new(settings.coordinator.worker_pool_size);
        let (manager, events) = ConnectionManager::new(config, connector, pool.clone(), shard_source);
        let ratelimit = Arc::new(RatelimitCoordinator::new(
            Arc::clone(&manager),
            settings.coordinator.ratelimit_interval_nanos,
        ));
        let ctx = Arc::new(SyncContext::new(manager, ratelimit, supporters, pool));

        let mut registry = EventRegistry::new();
        handlers::register_all(&mut registry)?;
        info!(
            handlers = registry.tags().len(),
            workers = ctx.pool.size(),
            "sync service built"
        );

        Ok(Self {
            ctx,
            registry: Arc::new(registry),
            shards: None,
            events: Mutex::new(Some(events)),
        })
    }

    /// Shared context.
    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Handler registry.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Start the coordinator (see [`ConnectionManager::start`]).
    pub async fn start(&self) -> Vec<JoinHandle<()>> {
        self.ctx.manager.start().await
    }

    /// Dispatch one message directly.
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        self.registry.dispatch(message, &self.ctx).await
    }

    /// Spawn the task that turns link events into dispatches and status
    /// changes. Runs until `cancel` fires or every channel sender is gone.
    ///
    /// Only the first call spawns anything.
    pub fn spawn_pump(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let Some(mut events) = self.events.lock().take() else {
            warn!("link event pump already running");
            return None;
        };
        let ctx = Arc::clone(&self.ctx);
        let registry = Arc::clone(&self.registry);
        Some(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else { break };
                match event {
                    LinkEvent::Frame {
                        cluster_id, frame, ..
                    } => {
                        let message = InboundMessage {
                            origin: Some(cluster_id),
                            frame,
                        };
                        let (task_ctx, task_registry) = (Arc::clone(&ctx), Arc::clone(&registry));
                        let _ = ctx.pool.spawn(async move {
                            let outcome = task_registry.dispatch(message, &task_ctx).await;
                            debug!(%cluster_id, ?outcome, "dispatched");
                        });
                    }
                    LinkEvent::Closed {
                        cluster_id,
                        connection_id,
                        reason,
                    } => ctx.manager.handle_channel_closed(cluster_id, &connection_id, reason),
                }
            }
            info!("link event pump stopped");
        }))
    }

    /// Spawn the recommended-shard refresh loop, when one is in use.
    pub fn spawn_shard_refresh(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        self.shards.as_ref().map(|cache| cache.spawn_refresh(cancel))
    }

    /// Close every channel and mark every cluster disconnected.
    pub fn shutdown(&self) {
        self.ctx.manager.disconnect_all();
        info!("sync service shut down");
    }
}
