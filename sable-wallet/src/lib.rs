//! Sable staking wallet.
//!
//! Holds the owned UTXO view and keys, selects stakeable coins, searches
//! for proof-of-stake kernels and assembles signed coinstake transactions.
//! Chain data arrives through the consensus crate's read-only handles; the
//! wallet never owns chain state.

#![forbid(unsafe_code)]

pub mod keystore;
pub mod sign;
pub mod staking;
pub mod wallet;

pub use crate::keystore::{KeyId, KeyStore};
pub use crate::wallet::{StakingWallet, WalletCoin, WalletError};
