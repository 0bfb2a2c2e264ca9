//! Types library for the order book feed services
//!
//! Value types shared between the feed synchronizer and anything that
//! consumes its events. Every type here is plain data: cheap to clone,
//! serializable, and free of I/O.
//!
//! # Modules
//! - `ids`: Identifiers (ProductId, OrderId)
//! - `numeric`: Decimal-backed Price and Size
//! - `book`: Book sides and level-3 entries
//! - `errors`: Validation errors for the types above

pub mod book;
pub mod errors;
pub mod ids;
pub mod numeric;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::book::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
}
