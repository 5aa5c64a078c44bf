//! Load reports: `HANDSHAKE` and `SERVER_COUNT`.

use std::sync::Arc;

use async_trait::async_trait;
use shardsync_core::{ClusterId, EventPayload, Result, SenderId};
use tracing::{debug, instrument};

use crate::context::SyncContext;
use crate::dispatch::registry::EventHandler;

/// Records the server count a cluster reports.
///
/// Load is recorded against the cluster whose channel delivered the frame.
/// Reports from non-cluster senders or without a channel are ignored.
pub struct LoadReportHandler;

#[async_trait]
impl EventHandler for LoadReportHandler {
    #[instrument(skip_all, fields(event = payload.event()))]
    async fn handle(
        &self,
        sender: &SenderId,
        origin: Option<ClusterId>,
        payload: EventPayload,
        ctx: &Arc<SyncContext>,
    ) -> Result<Option<EventPayload>> {
        if !sender.is_cluster() {
            debug!(%sender, "load report from non-cluster sender ignored");
            return Ok(None);
        }
        let Some(cluster_id) = origin else {
            debug!(%sender, "load report without a channel ignored");
            return Ok(None);
        };
        let load = match payload {
            EventPayload::ServerCount(count) => Some(count.server_count),
            EventPayload::Handshake(handshake) => handshake.server_count,
            _ => None,
        };
        if let Some(load) = load {
            ctx.manager.record_load(cluster_id, load)?;
            debug!(%cluster_id, load, "load recorded");
        }
        Ok(None)
    }
}
