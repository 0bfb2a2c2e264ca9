//! WebSocket transport
//!
//! The state machine never sees a socket type. A [`Connector`] hands back a
//! pair of channels: text frames to send, and [`SocketSignal`]s received.
//! Exactly one terminal signal (`Closed` or `Error`) ends each inbound
//! stream. Dropping the outbound sender closes the socket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TransportError;

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketSignal {
    Text(String),
    Closed,
    Error(String),
}

/// Both directions of an open socket.
#[derive(Debug)]
pub struct SocketConnection {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<SocketSignal>,
}

/// Opens feed sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<SocketConnection, TransportError>;
}

/// `tokio-tungstenite` backed connector.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<SocketConnection, TransportError> {
        let url = Url::parse(url)?;
        info!(url = %url, "Connecting to feed WebSocket");
        let (ws_stream, response) = connect_async(url.as_str()).await?;
        info!(status = ?response.status(), "Connected to feed WebSocket");

        let (mut sink, mut stream) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                debug!(len = text.len(), "Sending frame");
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "Failed to send frame");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let signal = match frame {
                    Ok(Message::Text(text)) => SocketSignal::Text(text),
                    Ok(Message::Close(frame)) => {
                        info!(?frame, "WebSocket closed by peer");
                        let _ = inbound_tx.send(SocketSignal::Closed);
                        return;
                    }
                    // Pings are answered by tungstenite itself.
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(SocketSignal::Error(e.to_string()));
                        return;
                    }
                };
                if inbound_tx.send(signal).is_err() {
                    // Nobody is listening any more; the connection was superseded.
                    return;
                }
            }
            let _ = inbound_tx.send(SocketSignal::Closed);
        });

        Ok(SocketConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let err = WsConnector::new().connect("not a url").await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }
}
