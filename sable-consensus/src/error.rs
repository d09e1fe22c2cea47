//! Consensus error taxonomy.
//!
//! One kind per distinct rejection reason; validation reports the first
//! failure together with the offending hash at the call site.

use sable_core::Hash256;
use thiserror::Error;

/// Failures of the proof-of-stake kernel checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// The staked output does not have enough confirmations
    #[error("kernel input has {depth} confirmations, {required} required")]
    Immature { depth: i32, required: i32 },

    /// The kernel hash does not meet the weighted target
    #[error("kernel hash above target for {outpoint} at time {time}")]
    HashMiss { outpoint: String, time: u32 },

    /// No stake modifier available for the previous block
    #[error("stake modifier unavailable at {0}")]
    ModifierUnavailable(Hash256),

    /// The coinstake timestamp does not satisfy the timestamp mask
    #[error("timestamp {0:#x} violates the stake timestamp mask")]
    MaskViolated(u32),

    /// The kernel input signature does not check out
    #[error("kernel input signature invalid: {0}")]
    SignatureInvalid(String),

    /// The staked output could not be found in the UTXO view
    #[error("staked output {0} not found")]
    UtxoMissing(String),
}

/// Failures of header and block validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Malformed header fields (bits out of range, bad version)
    #[error("bad block header: {0}")]
    BadHeader(String),

    /// Proof of work does not meet the claimed target
    #[error("proof of work failed")]
    BadPoW,

    /// Coinbase missing, duplicated, or paying too much
    #[error("bad coinbase: {0}")]
    BadCoinbase(String),

    /// Coinstake malformed, misplaced, or paying too much
    #[error("bad coinstake: {0}")]
    BadCoinstake(String),

    /// Merkle root does not match the transaction list
    #[error("merkle root mismatch")]
    BadMerkle,

    /// Witness commitment missing or wrong
    #[error("bad witness commitment: {0}")]
    BadWitness(String),

    /// Block hash differs from the hardcoded checkpoint at its height
    #[error("block at height {height} does not match checkpoint")]
    CheckpointMismatch { height: i32 },

    /// Block timestamp too far in the future
    #[error("block time {time} too far in the future")]
    FutureTime { time: u32 },

    /// Block timestamp not after median time past
    #[error("block time {time} not after median time past {median}")]
    StaleTime { time: u32, median: i64 },

    /// Block kind forbidden at this height or time (e.g. PoW after the cutoff)
    #[error("block kind not allowed: {0}")]
    VersionGated(String),

    /// A kernel check failed
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Failures constructing chain parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    /// Unrecognized network name
    #[error("unknown network {0:?}")]
    UnknownNetwork(String),
}

pub type Result<T, E = ConsensusError> = std::result::Result<T, E>;
