//! Order book snapshot fetching
//!
//! A snapshot is the full level-3 book at a declared sequence number. The
//! fetcher makes exactly one request per call; retry and backoff belong to
//! the connection state machine.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use types::book::BookEntry;
use types::ids::{OrderId, ProductId};
use types::numeric::{Price, Size};

use crate::config::FeedConfig;
use crate::error::SnapshotError;

/// One resting order as the snapshot endpoint lists it: `[price, size, order_id]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLevel(pub Price, pub Size, pub OrderId);

impl RawLevel {
    pub fn into_entry(self) -> BookEntry {
        BookEntry::new(self.0, self.1, self.2)
    }
}

/// Full book state at `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sequence: u64,
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
}

impl Snapshot {
    /// Decode a snapshot response body.
    pub fn from_json(body: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn order_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }
}

/// Source of order book snapshots.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch_snapshot(&self, product: &ProductId) -> Result<Snapshot, SnapshotError>;
}

/// Fetches snapshots from the exchange's public REST endpoint.
#[derive(Clone)]
pub struct RestSnapshotFetcher {
    client: Client,
    rest_url: String,
    level: u8,
    user_agent: String,
}

impl RestSnapshotFetcher {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            client: Client::new(),
            rest_url: config.rest_url.trim_end_matches('/').to_string(),
            level: config.snapshot_level,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Reuse an existing HTTP client (connection pool, proxies, timeouts).
    pub fn with_client(config: &FeedConfig, client: Client) -> Self {
        Self {
            client,
            ..Self::new(config)
        }
    }

    fn book_url(&self, product: &ProductId) -> String {
        format!(
            "{}/products/{}/book?level={}",
            self.rest_url, product, self.level
        )
    }
}

#[async_trait]
impl SnapshotFetcher for RestSnapshotFetcher {
    async fn fetch_snapshot(&self, product: &ProductId) -> Result<Snapshot, SnapshotError> {
        let url = self.book_url(product);
        debug!(%product, url = %url, "Requesting order book snapshot");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| SnapshotError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SnapshotError::Transport(e.to_string()))?;
        let snapshot = Snapshot::from_json(&body)?;

        info!(
            %product,
            sequence = snapshot.sequence,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "Fetched order book snapshot"
        );
        Ok(snapshot)
    }
}
