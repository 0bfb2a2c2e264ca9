//! Error taxonomy for the feed synchronizer
//!
//! Transport and protocol problems are absorbed by the connection state
//! machine and only show up as emitted events. What reaches a caller is
//! either a misuse (`NotConnected`) or the terminal `GaveUp`.

use thiserror::Error;

/// Failure to obtain or decode an order book snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot transport error: {0}")]
    Transport(String),

    #[error("snapshot request returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("snapshot parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SnapshotError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SnapshotError::HttpStatus {
                status: status.as_u16(),
            },
            None if err.is_decode() => SnapshotError::Parse(err.to_string()),
            None => SnapshotError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Parse(err.to_string())
    }
}

/// Failure to open the WebSocket feed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid feed url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Errors surfaced to the owner of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("gave up after {failures} consecutive connection failures")]
    GaveUp { failures: u32 },

    #[error("no active connection to disconnect")]
    NotConnected,

    #[error("feed task has stopped")]
    Stopped,
}
