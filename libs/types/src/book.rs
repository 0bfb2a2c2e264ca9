//! Level-3 book entry types

use serde::{Deserialize, Serialize};

use crate::errors::TypeError;
use crate::ids::OrderId;
use crate::numeric::{Price, Size};

/// Book side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }

    pub fn parse(s: &str) -> Result<Self, TypeError> {
        match s {
            "buy" => Ok(Side::BUY),
            "sell" => Ok(Side::SELL),
            other => Err(TypeError::InvalidSide(other.to_string())),
        }
    }
}

/// A single resting order.
///
/// Entries are values: an update replaces the whole entry rather than
/// mutating it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEntry {
    pub price: Price,
    pub size: Size,
    pub order_id: OrderId,
}

impl BookEntry {
    pub fn new(price: Price, size: Size, order_id: OrderId) -> Self {
        Self {
            price,
            size,
            order_id,
        }
    }

    /// Copy of this entry with a different size.
    pub fn with_size(&self, size: Size) -> Self {
        Self {
            price: self.price,
            size,
            order_id: self.order_id.clone(),
        }
    }
}
