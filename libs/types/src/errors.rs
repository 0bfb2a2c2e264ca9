//! Error types for value construction
//!
//! Raised when wire data cannot be turned into one of the library's types.

use thiserror::Error;

/// Validation errors for identifiers and numeric values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    #[error("Invalid product id: {0}")]
    InvalidProduct(String),

    #[error("Invalid order id: {0}")]
    InvalidOrderId(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid side: {0}")]
    InvalidSide(String),
}
