//! `SERVER_ROUTE`.

use std::sync::Arc;

use async_trait::async_trait;
use shardsync_core::events::ServerRouteResult;
use shardsync_core::{ClusterId, EventPayload, Result, SenderId, SyncError};
use tracing::{debug, instrument};

use crate::context::SyncContext;
use crate::dispatch::registry::EventHandler;

/// Resolves an entity to its shard and connected owner.
///
/// An unowned shard still gets a reply, with no `clusterId`. A missing shard
/// total is an error.
pub struct ServerRouteHandler;

#[async_trait]
impl EventHandler for ServerRouteHandler {
    #[instrument(skip_all, fields(event = "SERVER_ROUTE", %sender))]
    async fn handle(
        &self,
        sender: &SenderId,
        _origin: Option<ClusterId>,
        payload: EventPayload,
        ctx: &Arc<SyncContext>,
    ) -> Result<Option<EventPayload>> {
        let EventPayload::ServerRoute(request) = payload else {
            return Err(SyncError::Upstream(format!(
                "unexpected payload {} for SERVER_ROUTE",
                payload.event()
            )));
        };
        let shard = ctx.manager.resolve_shard(request.server_id)?;
        let cluster_id = ctx.manager.resolve_cluster(request.server_id).ok().map(|c| c.id);
        debug!(server_id = request.server_id, shard, ?cluster_id, "route resolved");
        Ok(Some(EventPayload::ServerRouteResult(ServerRouteResult {
            server_id: request.server_id,
            shard,
            cluster_id,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_helpers::make_test_context;
    use crate::manager::ManagerConfig;
    use assert_matches::assert_matches;
    use shardsync_core::events::ServerRoute;
    use shardsync_core::{Cluster, ShardInterval};

    fn route(server_id: u64) -> EventPayload {
        EventPayload::ServerRoute(ServerRoute { server_id })
    }

    #[tokio::test]
    async fn without_total_is_not_configured() {
        let t = make_test_context(ManagerConfig::default());
        let result = ServerRouteHandler
            .handle(&SenderId::new("cluster_1"), Some(ClusterId::new(1)), route(1), &t.ctx)
            .await;
        assert_matches!(result, Err(SyncError::NotConfigured));
    }

    #[tokio::test]
    async fn unowned_shard_replies_without_cluster() {
        let t = make_test_context(ManagerConfig {
            total_shards: Some(20),
            ..ManagerConfig::default()
        });
        let reply = ServerRouteHandler
            .handle(&SenderId::new("cluster_1"), Some(ClusterId::new(1)), route(15 << 22), &t.ctx)
            .await
            .unwrap();
        assert_eq!(
            reply,
            Some(EventPayload::ServerRouteResult(ServerRouteResult {
                server_id: 15 << 22,
                shard: 15,
                cluster_id: None,
            }))
        );
    }

    #[tokio::test]
    async fn owned_shard_names_connected_cluster() {
        let mut t = make_test_context(ManagerConfig {
            total_shards: Some(20),
            ..ManagerConfig::default()
        });
        let cluster = Cluster::new(ClusterId::new(2), "mem://2")
            .with_shard_interval(ShardInterval::new(10, 20).unwrap());
        t.ctx.manager.add_cluster(cluster).unwrap();
        t.ctx.manager.connect_cluster(ClusterId::new(2), false, false).await.unwrap();
        let _peer = t.peers.recv().await.unwrap();

        let reply = ServerRouteHandler
            .handle(&SenderId::new("cluster_1"), Some(ClusterId::new(1)), route(15 << 22), &t.ctx)
            .await
            .unwrap();
        assert_matches!(
            reply,
            Some(EventPayload::ServerRouteResult(ServerRouteResult { shard: 15, cluster_id: Some(id), .. }))
                if id == ClusterId::new(2)
        );
    }
}
