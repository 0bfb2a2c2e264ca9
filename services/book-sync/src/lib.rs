//! Book Sync Service
//!
//! Keeps a local level-3 order book for one product in sync with an
//! exchange's full-channel WebSocket feed:
//! - Subscribes to the feed and queues updates while a snapshot loads
//! - Merges the REST snapshot, then replays the queue in receipt order
//! - Validates every sequenced message (stale, in order, gap)
//! - Publishes typed events to per-kind subscribers
//! - Reconnects on a fixed delay and gives up after repeated failures
//!
//! # Architecture
//!
//! ```text
//!   WebSocket ──┐          ┌── REST snapshot
//!               │          │
//!           ┌───▼──────────▼───┐
//!           │     BookFeed     │  ← single task, epoch-tagged mailbox
//!           │  ┌────────────┐  │
//!           │  │FeedMachine │  │
//!           │  └─┬───────┬──┘  │
//!           └────┼───────┼─────┘
//!                │       │
//!         ┌──────▼─┐  ┌──▼──────┐
//!         │Pending │  │OrderBook│
//!         │ Queue  │  │  Store  │
//!         └────────┘  └─────────┘
//!                │
//!          ┌─────▼──────┐
//!          │EventEmitter│ → subscribers
//!          └────────────┘
//! ```

pub mod config;
pub mod connection;
pub mod emitter;
pub mod error;
pub mod events;
pub mod metrics;
pub mod order_book;
pub mod pending;
pub mod sequence;
pub mod snapshot;
pub mod transport;

pub use config::FeedConfig;
pub use connection::{BookFeed, BookView, FeedMachine};
pub use emitter::EventEmitter;
pub use error::FeedError;
pub use events::{ConnectionState, EventKind, FeedEvent, UpdateKind};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
