//! Transport connectors.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shardsync_core::{Cluster, Result, SyncError};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument};

/// Raw text link to one cluster.
///
/// Dropping `outbound` closes the write side. `inbound` yields `None` once
/// the peer is gone.
#[derive(Debug)]
pub struct RawLink {
    /// Text messages to the cluster.
    pub outbound: mpsc::Sender<String>,
    /// Text messages from the cluster.
    pub inbound: mpsc::Receiver<String>,
}

/// Opens raw links to clusters.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a link to `cluster`. Fails with [`SyncError::Connect`].
    async fn connect(&self, cluster: &Cluster) -> Result<RawLink>;
}

/// Dials the cluster's WebSocket endpoint.
#[derive(Clone, Debug)]
pub struct WsConnector {
    buffer: usize,
}

impl WsConnector {
    /// Connector whose link queues hold `buffer` messages each.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Connector for WsConnector {
    #[instrument(skip_all, fields(cluster_id = %cluster.id, endpoint = %cluster.endpoint))]
    async fn connect(&self, cluster: &Cluster) -> Result<RawLink> {
        let (ws, _response) = tokio_tungstenite::connect_async(cluster.endpoint.as_str())
            .await
            .map_err(|e| SyncError::Connect {
                cluster: cluster.id,
                message: e.to_string(),
            })?;
        info!("websocket link established");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(self.buffer);
        let (in_tx, in_rx) = mpsc::channel::<String>(self.buffer);
        let cluster_id = cluster.id;

        // Writer: ends when the channel drops its sender or the socket breaks.
        let _writer = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
            debug!(%cluster_id, "websocket writer finished");
        });

        // Reader: ends on close, socket error, or when nobody reads inbound.
        let _reader = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text.as_str().to_owned(),
                    Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(%cluster_id, error = %e, "websocket read failed");
                        break;
                    }
                };
                if in_tx.send(text).await.is_err() {
                    break;
                }
            }
            debug!(%cluster_id, "websocket reader finished");
        });

        Ok(RawLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
