//! Read-only HTTP status endpoint.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use shardsync_core::{Cluster, ConnectionStatus};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::context::SyncContext;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Process context.
    pub ctx: Arc<SyncContext>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Cluster counts by connection status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterCounts {
    /// All registered clusters.
    pub total: usize,
    /// Never connected or disconnected on purpose.
    pub disconnected: usize,
    /// Connect in progress.
    pub connecting: usize,
    /// Connected.
    pub connected: usize,
    /// Last connect or channel failed.
    pub failed: usize,
}

/// `/health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: String,
    /// Seconds since the context was built.
    pub uptime_secs: u64,
    /// Response time, RFC 3339.
    pub timestamp: String,
    /// Clusters by status.
    pub clusters: ClusterCounts,
    /// Open cluster channels.
    pub open_channels: usize,
    /// Fleet-wide shard total, if known.
    pub total_shards: Option<u32>,
    /// Current rate-limit interval.
    pub ratelimit_interval_nanos: i64,
}

/// Build a health response from the live context.
pub fn health_check(ctx: &SyncContext) -> HealthResponse {
    let mut clusters = ClusterCounts::default();
    for (status, count) in ctx.manager.registry().status_counts() {
        clusters.total += count;
        match status {
            ConnectionStatus::Disconnected => clusters.disconnected = count,
            ConnectionStatus::Connecting => clusters.connecting = count,
            ConnectionStatus::Connected => clusters.connected = count,
            ConnectionStatus::Failed => clusters.failed = count,
        }
    }
    HealthResponse {
        status: "ok".into(),
        uptime_secs: ctx.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        clusters,
        open_channels: ctx.manager.open_channels(),
        total_shards: ctx.manager.total_shards(),
        ratelimit_interval_nanos: ctx.ratelimit.interval_nanos(),
    }
}

/// Build the status router.
pub fn router(ctx: Arc<SyncContext>, metrics: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/clusters", get(clusters_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(AppState { ctx, metrics })
}

/// Serve `router` on `listener` until `token` is cancelled.
pub async fn serve(listener: TcpListener, router: Router, token: CancellationToken) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "status endpoint listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(&state.ctx))
}

/// GET /clusters
async fn clusters_handler(State(state): State<AppState>) -> Json<Vec<Cluster>> {
    Json(state.ctx.manager.clusters())
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_helpers::make_test_context;
    use crate::manager::ManagerConfig;
    use axum::body::Body;
    use axum::http::Request;
    use shardsync_core::ClusterId;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let parsed = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, parsed)
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let t = make_test_context(ManagerConfig {
            total_shards: Some(16),
            ..ManagerConfig::default()
        });
        t.ctx.manager.add_cluster(Cluster::new(ClusterId::new(1), "mem://1")).unwrap();
        t.ctx.manager.add_cluster(Cluster::new(ClusterId::new(2), "mem://2")).unwrap();

        let (status, body) = get_json(router(Arc::clone(&t.ctx), None), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["clusters"]["total"], 2);
        assert_eq!(body["clusters"]["disconnected"], 2);
        assert_eq!(body["clusters"]["connected"], 0);
        assert_eq!(body["open_channels"], 0);
        assert_eq!(body["total_shards"], 16);
        assert_eq!(body["ratelimit_interval_nanos"], 20_000_000);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn clusters_lists_registry() {
        let t = make_test_context(ManagerConfig::default());
        t.ctx.manager.add_cluster(Cluster::new(ClusterId::new(3), "ws://c3")).unwrap();
        let (status, body) = get_json(router(Arc::clone(&t.ctx), None), "/clusters").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], 3);
        assert_eq!(body[0]["endpoint"], "ws://c3");
        assert_eq!(body[0]["status"], "DISCONNECTED");
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let t = make_test_context(ManagerConfig::default());
        let (status, _) = get_json(router(Arc::clone(&t.ctx), None), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let t = make_test_context(ManagerConfig::default());
        let (status, _) = get_json(router(Arc::clone(&t.ctx), None), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
