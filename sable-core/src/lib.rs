//! Sable Core
//!
//! Core data structures and wire encoding for the Sable cryptocurrency:
//! 256-bit hashes, compact difficulty targets, scripts, transactions and
//! blocks in the Blackcoin-family format (timestamped transactions, hybrid
//! proof-of-work / proof-of-stake block headers).

#![forbid(unsafe_code)]

pub mod amount;
pub mod arith;
pub mod block;
pub mod error;
pub mod hashes;
pub mod script;
pub mod serialize;
pub mod transaction;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::amount::{Amount, CENT, COIN, MAX_MONEY};
    pub use crate::block::{Block, BlockHeader};
    pub use crate::hashes::Hash256;
    pub use crate::script::Script;
    pub use crate::transaction::{OutPoint, Transaction, TxInput, TxOutput};
}

pub use crate::error::{CoreError, Result};
pub use crate::hashes::Hash256;
