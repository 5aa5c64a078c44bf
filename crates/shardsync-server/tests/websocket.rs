//! End to end over a real WebSocket with a fake cluster.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{settings, wait_status};
use futures::{SinkExt, StreamExt};
use shardsync_core::events::{EventPayload, Handshake, ServerRoute, tags};
use shardsync_core::{ClusterId, ConnectionStatus, SenderId, SyncFrame};
use shardsync_server::dispatch::handlers::StaticSupporters;
use shardsync_server::{SyncService, WsConnector};
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

async fn recv(ws: &mut WebSocketStream<TcpStream>) -> SyncFrame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            return SyncFrame::decode(text.as_str()).unwrap();
        }
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, payload: &EventPayload) {
    let frame = SyncFrame::from_payload(SenderId::cluster(ClusterId::new(1)), payload).unwrap();
    ws.send(Message::Text(frame.encode().unwrap().into())).await.unwrap();
}

#[tokio::test]
async fn fake_cluster_connects_and_routes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = settings(Some(8), &[(1, Some((0, 8)))]);
    config.clusters[0].endpoint = format!("ws://{addr}");
    config.clusters[0].auto_connect = true;
    config.coordinator.connect_timeout_ms = 3_000;

    let service = SyncService::with_sources(
        &config,
        Arc::new(WsConnector::default()),
        None,
        Arc::new(StaticSupporters::default()),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let _pump = service.spawn_pump(cancel.clone()).unwrap();
    let (connected_tx, connected_rx) = tokio::sync::oneshot::channel::<()>();

    let cluster = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let start = recv(&mut ws).await;
        assert_eq!(start.event, tags::CLUSTER_START);
        assert_eq!(start.sender_id.as_str(), "sync");
        assert_eq!(start.data["clusterId"], 1);
        assert_eq!(start.data["totalShards"], 8);

        send(&mut ws, &EventPayload::Handshake(Handshake {
            cluster_id: ClusterId::new(1),
            server_count: Some(42),
        }))
        .await;

        // Route only once the coordinator reports the cluster connected.
        connected_rx.await.unwrap();
        send(&mut ws, &EventPayload::ServerRoute(ServerRoute { server_id: 5 << 22 })).await;
        let reply = recv(&mut ws).await;
        assert_eq!(reply.event, tags::SERVER_ROUTE_RESULT);
        assert_eq!(reply.data["shard"], 5);
        assert_eq!(reply.data["clusterId"], 1);

        ws.close(None).await.unwrap();
    });

    for handle in service.start().await {
        handle.await.unwrap();
    }
    let manager = &service.context().manager;
    let connected = manager.cluster(ClusterId::new(1)).unwrap();
    assert_eq!(connected.status, ConnectionStatus::Connected);
    assert_eq!(connected.reported_load, Some(42));
    connected_tx.send(()).unwrap();

    cluster.await.unwrap();
    assert_eq!(wait_status(manager, 1, ConnectionStatus::Failed).await, ConnectionStatus::Failed);
    cancel.cancel();
}

#[tokio::test]
async fn unreachable_endpoint_fails_the_cluster() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = settings(None, &[(1, None)]);
    config.clusters[0].endpoint = format!("ws://{addr}");
    let service = SyncService::with_sources(
        &config,
        Arc::new(WsConnector::default()),
        None,
        Arc::new(StaticSupporters::default()),
    )
    .unwrap();
    let _ = service.start().await;
    let manager = &service.context().manager;
    let result = manager.connect_cluster(ClusterId::new(1), true, false).await;
    assert!(result.is_err());
    assert_eq!(manager.cluster(ClusterId::new(1)).unwrap().status, ConnectionStatus::Failed);
}
