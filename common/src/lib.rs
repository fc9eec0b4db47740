//! Wallet Common Types
//!
//! Shared types used across the wallet ledger: identifiers, money helpers,
//! the error taxonomy and timing constants.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;
