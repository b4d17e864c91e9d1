use super::ConnectionError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{CloseFrame, Message as WsMessage, frame::coding::CloseCode},
};
use tracing::{debug, info, warn};

/// An inbound item from a live transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The transport ended. `server_initiated` is set when the peer closed it
    /// deliberately with a normal close code.
    Closed { server_initiated: bool },
}

/// One established connection, as a pair of channels.
///
/// Dropping `outbound` closes the connection from our side.
pub struct Transport {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<Frame>,
}

/// Establishes transports. The connection manager owns at most one at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError>;
}

/// Connects over WebSocket with `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| ConnectionError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        info!(%url, "WebSocket transport established");
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        // Writer: forwards outbound frames, then says goodbye once we hang up.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = ws_tx.send(WsMessage::Text(text.into())).await {
                    warn!(error = %e, "WebSocket write failed");
                    return;
                }
            }
            let goodbye = WsMessage::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "client disconnect".into(),
            }));
            let _ = ws_tx.send(goodbye).await;
            debug!("WebSocket writer finished");
        });

        // Reader: forwards text frames in arrival order until the stream ends.
        tokio::spawn(async move {
            let mut server_initiated = false;
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        if inbound_tx.send(Frame::Text(text.as_str().to_owned())).is_err() {
                            return;
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        server_initiated = frame
                            .as_ref()
                            .is_some_and(|f| f.code == CloseCode::Normal);
                        info!(?frame, "WebSocket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
            let _ = inbound_tx.send(Frame::Closed { server_initiated });
        });

        Ok(Transport {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
