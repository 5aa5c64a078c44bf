//! `RATELIMIT_FETCH`.

use std::sync::Arc;

use async_trait::async_trait;
use shardsync_core::{ClusterId, EventPayload, Result, SenderId};
use tracing::instrument;

use crate::context::SyncContext;
use crate::dispatch::registry::EventHandler;

/// Replies with the current shared interval.
pub struct RatelimitFetchHandler;

#[async_trait]
impl EventHandler for RatelimitFetchHandler {
    #[instrument(skip_all, fields(event = "RATELIMIT_FETCH", %sender))]
    async fn handle(
        &self,
        sender: &SenderId,
        _origin: Option<ClusterId>,
        _payload: EventPayload,
        ctx: &Arc<SyncContext>,
    ) -> Result<Option<EventPayload>> {
        Ok(Some(ctx.ratelimit.payload()))
    }
}
