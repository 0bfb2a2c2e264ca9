//! Identifier types for feed entities
//!
//! Exchange identifiers arrive as strings on the wire and are kept as
//! strings; the newtypes only prevent a product id from being passed where
//! an order id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::TypeError;

/// Identifier of a resting order as assigned by the exchange
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Try to create an OrderId, rejecting empty strings
    pub fn try_new(id: impl Into<String>) -> Result<Self, TypeError> {
        let s = id.into();
        if s.trim().is_empty() {
            return Err(TypeError::InvalidOrderId(s));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Product identifier (the instrument a book tracks)
///
/// Format: "BASE-QUOTE" (e.g., "BTC-USD", "ETH-EUR")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Create a new ProductId from a string
    ///
    /// # Panics
    /// Panics if the format is invalid (must contain '-')
    pub fn new(symbol: impl Into<String>) -> Self {
        let s = symbol.into();
        assert!(s.contains('-'), "ProductId must be in BASE-QUOTE format");
        Self(s)
    }

    /// Try to create a ProductId, returning an error if invalid
    pub fn try_new(symbol: impl Into<String>) -> Result<Self, TypeError> {
        let s = symbol.into();
        match s.split_once('-') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => Ok(Self(s)),
            _ => Err(TypeError::InvalidProduct(s)),
        }
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into base and quote assets
    pub fn split(&self) -> (&str, &str) {
        self.0.split_once('-').unwrap_or((self.0.as_str(), ""))
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_serialization() {
        let id = OrderId::new("3b0f1225-7f84-490b-a29f-0faef9de823a");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"3b0f1225-7f84-490b-a29f-0faef9de823a\"");
        let deserialized: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_order_id_rejects_empty() {
        assert!(OrderId::try_new("").is_err());
        assert!(OrderId::try_new("  ").is_err());
        assert!(OrderId::try_new("a").is_ok());
    }

    #[test]
    fn test_product_id_creation() {
        let product = ProductId::new("BTC-USD");
        assert_eq!(product.as_str(), "BTC-USD");
        assert_eq!(product.split(), ("BTC", "USD"));
    }

    #[test]
    #[should_panic(expected = "BASE-QUOTE")]
    fn test_product_id_invalid_panics() {
        ProductId::new("BTCUSD");
    }

    #[test]
    fn test_product_id_try_new() {
        assert!(ProductId::try_new("ETH-EUR").is_ok());
        assert_eq!(
            ProductId::try_new("ETH-"),
            Err(TypeError::InvalidProduct("ETH-".to_string()))
        );
        assert!(ProductId::try_new("ETHEUR").is_err());
    }
}
