//! In-memory level-3 order book
//!
//! Holds every resting order keyed by order id, one map per side, plus the
//! sequence number of the last accepted mutation. Entries are values:
//! updates replace them wholesale.
//!
//! The store is written only by the connection state machine. Read views
//! (best prices, aggregated depth) are computed on demand and returned by
//! value.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use types::book::{BookEntry, Side};
use types::ids::OrderId;
use types::numeric::{Price, Size};

use crate::events::{UpdateKind, UpdateMessage};
use crate::snapshot::Snapshot;

/// Aggregated view of all orders resting at one price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    /// Total size at this level across all orders.
    pub total_size: Decimal,
    /// Number of orders resting at this level.
    pub order_count: u32,
}

/// Aggregated depth at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDepth {
    /// Bids in descending price order (best first).
    pub bids: Vec<PriceLevel>,
    /// Asks in ascending price order (best first).
    pub asks: Vec<PriceLevel>,
    pub sequence: Option<u64>,
}

/// What a level-3 message did to the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookChange {
    Inserted(Side, OrderId),
    Removed(Side, OrderId),
    Resized(Side, OrderId),
    /// Message kind carries no book mutation, or referenced an unknown order.
    Unchanged,
}

/// Order book for a single product.
#[derive(Debug, Clone, Default)]
pub struct OrderBookStore {
    sequence: Option<u64>,
    bids: HashMap<OrderId, BookEntry>,
    asks: HashMap<OrderId, BookEntry>,
}

impl OrderBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence of the last accepted mutation; `None` before the first snapshot.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Record `sequence` as the last accepted one. Callers validate first.
    pub fn advance_to(&mut self, sequence: u64) {
        debug_assert!(self.sequence.map_or(true, |current| sequence > current));
        self.sequence = Some(sequence);
    }

    /// Load a snapshot: every level becomes an entry, and the book takes the
    /// snapshot's sequence.
    pub fn merge_snapshot(&mut self, snapshot: Snapshot) {
        let Snapshot {
            sequence,
            bids,
            asks,
        } = snapshot;

        for level in bids {
            self.insert(Side::BUY, level.into_entry());
        }
        for level in asks {
            self.insert(Side::SELL, level.into_entry());
        }
        self.sequence = Some(sequence);
    }

    /// Insert or replace an entry. An order id lives on one side only.
    pub fn insert(&mut self, side: Side, entry: BookEntry) {
        self.side_mut(side.opposite()).remove(&entry.order_id);
        self.side_mut(side).insert(entry.order_id.clone(), entry);
    }

    /// Remove an order from whichever side holds it.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<(Side, BookEntry)> {
        if let Some(entry) = self.bids.remove(order_id) {
            return Some((Side::BUY, entry));
        }
        self.asks.remove(order_id).map(|entry| (Side::SELL, entry))
    }

    /// Replace an order's entry with one carrying `size`.
    pub fn resize(&mut self, order_id: &OrderId, size: Size) -> Option<Side> {
        let (side, entry) = self.get(order_id)?;
        let replaced = entry.with_size(size);
        self.side_mut(side).insert(order_id.clone(), replaced);
        Some(side)
    }

    pub fn get(&self, order_id: &OrderId) -> Option<(Side, &BookEntry)> {
        if let Some(entry) = self.bids.get(order_id) {
            return Some((Side::BUY, entry));
        }
        self.asks.get(order_id).map(|entry| (Side::SELL, entry))
    }

    /// Apply the book effect of an accepted level-3 message.
    ///
    /// - `open` inserts the order
    /// - `done` removes it
    /// - `match` shrinks the maker order by the traded size
    /// - `change` replaces the order's size
    ///
    /// Other kinds, and messages missing a required field, leave the book
    /// untouched.
    pub fn apply(&mut self, message: &UpdateMessage) -> BookChange {
        let change = match message.kind {
            UpdateKind::Open => self.apply_open(message),
            UpdateKind::Done => message
                .str_field("order_id")
                .map(OrderId::new)
                .and_then(|id| self.remove(&id).map(|(side, _)| BookChange::Removed(side, id))),
            UpdateKind::Match => self.apply_match(message),
            UpdateKind::Change => self.apply_change(message),
            _ => Some(BookChange::Unchanged),
        };

        change.unwrap_or_else(|| {
            debug!(
                kind = message.kind.label(),
                sequence = ?message.sequence,
                "Message left the book unchanged"
            );
            BookChange::Unchanged
        })
    }

    fn apply_open(&mut self, message: &UpdateMessage) -> Option<BookChange> {
        let order_id = OrderId::try_new(message.str_field("order_id")?).ok()?;
        let side = Side::parse(message.str_field("side")?).ok()?;
        let price: Price = decimal_field(message, "price")?;
        let size: Size = decimal_field(message, "remaining_size")?;

        self.insert(side, BookEntry::new(price, size, order_id.clone()));
        Some(BookChange::Inserted(side, order_id))
    }

    fn apply_match(&mut self, message: &UpdateMessage) -> Option<BookChange> {
        let maker = OrderId::new(message.str_field("maker_order_id")?);
        let traded: Size = decimal_field(message, "size")?;
        let (_, entry) = self.get(&maker)?;
        let remaining = entry.size.saturating_sub(traded);

        let side = self.resize(&maker, remaining)?;
        Some(BookChange::Resized(side, maker))
    }

    fn apply_change(&mut self, message: &UpdateMessage) -> Option<BookChange> {
        let order_id = OrderId::new(message.str_field("order_id")?);
        let new_size: Size = decimal_field(message, "new_size")?;

        let side = self.resize(&order_id, new_size)?;
        Some(BookChange::Resized(side, order_id))
    }

    /// Drop every entry and forget the sequence.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.sequence = None;
    }

    pub fn bids(&self) -> &HashMap<OrderId, BookEntry> {
        &self.bids
    }

    pub fn asks(&self) -> &HashMap<OrderId, BookEntry> {
        &self.asks
    }

    pub fn order_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Highest bid price.
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.values().map(|e| e.price).max()
    }

    /// Lowest ask price.
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.values().map(|e| e.price).min()
    }

    /// Spread between best ask and best bid.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.as_decimal() - bid.as_decimal()),
            _ => None,
        }
    }

    /// Average of best bid and best ask.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                Some((bid.as_decimal() + ask.as_decimal()) / Decimal::from(2))
            }
            _ => None,
        }
    }

    /// Aggregate orders into price levels, at most `max_levels` per side.
    pub fn depth(&self, max_levels: usize) -> BookDepth {
        BookDepth {
            bids: aggregate(&self.bids).into_values().rev().take(max_levels).collect(),
            asks: aggregate(&self.asks).into_values().take(max_levels).collect(),
            sequence: self.sequence,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut HashMap<OrderId, BookEntry> {
        match side {
            Side::BUY => &mut self.bids,
            Side::SELL => &mut self.asks,
        }
    }
}

fn aggregate(entries: &HashMap<OrderId, BookEntry>) -> BTreeMap<Price, PriceLevel> {
    let mut levels: BTreeMap<Price, PriceLevel> = BTreeMap::new();
    for entry in entries.values() {
        levels
            .entry(entry.price)
            .and_modify(|level| {
                level.total_size += entry.size.as_decimal();
                level.order_count += 1;
            })
            .or_insert_with(|| PriceLevel {
                price: entry.price,
                total_size: entry.size.as_decimal(),
                order_count: 1,
            });
    }
    levels
}

/// Decode a price/size field sent either as a JSON string or a number.
fn decimal_field<T>(message: &UpdateMessage, name: &str) -> Option<T>
where
    T: serde::de::DeserializeOwned,
{
    let value = message.raw.get(name)?;
    serde_json::from_value(value.clone()).ok()
}
