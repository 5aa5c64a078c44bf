//! Shared process context.

use std::sync::Arc;
use std::time::Instant;

use crate::dispatch::handlers::SupporterSource;
use crate::manager::ConnectionManager;
use crate::pool::WorkerPool;
use crate::ratelimit::RatelimitCoordinator;

/// Everything a handler, the console or the status endpoint needs.
///
/// Built once by [`crate::service::SyncService`] and passed around by `Arc`.
pub struct SyncContext {
    /// Cluster lifecycle, routing and sends.
    pub manager: Arc<ConnectionManager>,
    /// Shared rate-limit interval.
    pub ratelimit: Arc<RatelimitCoordinator>,
    /// Where supporter tiers come from.
    pub supporters: Arc<dyn SupporterSource>,
    /// Background task pool.
    pub pool: WorkerPool,
    /// When the context was built.
    pub started_at: Instant,
}

impl SyncContext {
    /// Assemble a context.
    pub fn new(
        manager: Arc<ConnectionManager>,
        ratelimit: Arc<RatelimitCoordinator>,
        supporters: Arc<dyn SupporterSource>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            manager,
            ratelimit,
            supporters,
            pool,
            started_at: Instant::now(),
        }
    }
}
