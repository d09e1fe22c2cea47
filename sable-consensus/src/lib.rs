//! Sable consensus rules.
//!
//! Chain parameters with time-gated protocol versions, exponential-moving-
//! average difficulty retargeting, the proof-of-stake kernel test, and full
//! header/block validation for the hybrid PoW/PoS chain. The block index
//! arena, UTXO view and clock are supplied by the caller; nothing in this
//! crate touches the network or disk.

#![forbid(unsafe_code)]

pub mod chain;
pub mod deployments;
pub mod error;
pub mod kernel;
pub mod params;
pub mod policy;
pub mod pow;
pub mod subsidy;
pub mod validation;

pub use crate::chain::{BlockId, BlockIndex, BlockTree};
pub use crate::error::{ConsensusError, KernelError, ParamsError};
pub use crate::kernel::{Coin, CoinView, StakeCache};
pub use crate::params::{ChainParams, Network};
