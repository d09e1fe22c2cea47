//! Sable node mining.
//!
//! The mempool keeps pending transactions indexed by ancestor fee score;
//! the block assembler drains it into templates honoring weight, sigop and
//! dependency constraints; the staker thread drives coinstake search and
//! submits signed proof-of-stake blocks to the chain manager.

#![forbid(unsafe_code)]

pub mod error;
pub mod mempool;
pub mod miner;
pub mod staker;

pub use crate::error::{AssemblyError, StakerError};
pub use crate::mempool::{EntryId, MemPoolEntry, MempoolView, TxMemPool};
pub use crate::miner::{AssemblerOptions, BlockAssembler, BlockTemplate};
pub use crate::staker::{can_stake, sleep_staker, BlockSink, NodeState, Staker, StakerConfig, StakerHandle};
