//! Feed configuration
//!
//! Defaults point at the public Coinbase Exchange endpoints. Every field can
//! be overridden from `BOOK_SYNC_*` environment variables; unset or
//! unparseable variables fall back to the default.

use std::time::Duration;

use types::ids::ProductId;

const DEFAULT_PRODUCT: &str = "BTC-USD";
const DEFAULT_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";
const DEFAULT_REST_URL: &str = "https://api.exchange.coinbase.com";
const DEFAULT_USER_AGENT: &str = "book-sync/0.1";

/// Configuration for a single-product feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Product the book tracks.
    pub product_id: ProductId,
    /// WebSocket feed endpoint.
    pub websocket_url: String,
    /// REST base URL used for snapshots.
    pub rest_url: String,
    /// Depth level requested from the snapshot endpoint (3 = full order-level book).
    pub snapshot_level: u8,
    /// Fixed delay before a reconnect attempt.
    pub reconnect_delay: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_consecutive_failures: u32,
    /// User-Agent sent with snapshot requests.
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            product_id: ProductId::new(DEFAULT_PRODUCT),
            websocket_url: DEFAULT_WS_URL.to_string(),
            rest_url: DEFAULT_REST_URL.to_string(),
            snapshot_level: 3,
            reconnect_delay: Duration::from_secs(5),
            max_consecutive_failures: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FeedConfig {
    /// Default configuration for another product.
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id,
            ..Self::default()
        }
    }

    /// Create a configuration from environment variables.
    /// Falls back to defaults if not set.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let product_id = std::env::var("BOOK_SYNC_PRODUCT")
            .ok()
            .and_then(|s| ProductId::try_new(s).ok())
            .unwrap_or(defaults.product_id);

        let websocket_url = std::env::var("BOOK_SYNC_WS_URL").unwrap_or(defaults.websocket_url);
        let rest_url = std::env::var("BOOK_SYNC_REST_URL").unwrap_or(defaults.rest_url);

        let snapshot_level = std::env::var("BOOK_SYNC_SNAPSHOT_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.snapshot_level);

        let reconnect_delay = std::env::var("BOOK_SYNC_RECONNECT_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.reconnect_delay);

        let max_consecutive_failures = std::env::var("BOOK_SYNC_MAX_FAILURES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_consecutive_failures);

        let user_agent = std::env::var("BOOK_SYNC_USER_AGENT").unwrap_or(defaults.user_agent);

        Self {
            product_id,
            websocket_url,
            rest_url,
            snapshot_level,
            reconnect_delay,
            max_consecutive_failures,
            user_agent,
        }
    }
}
