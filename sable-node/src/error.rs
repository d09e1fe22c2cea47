//! Node-side error kinds.

use thiserror::Error;

/// Failures during block template construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// The mempool snapshot could not be taken
    #[error("mempool unavailable: {0}")]
    MempoolLocked(String),

    /// The template outgrew the configured weight limit
    #[error("template weight {weight} exceeds the limit {limit}")]
    TemplateTooLarge { weight: usize, limit: usize },

    /// The finished template failed its own validity probe. This is an
    /// internal inconsistency, fatal outside of regtest.
    #[error("template failed validation: {0}")]
    ValidityProbeFailed(String),
}

/// Failures of the staking loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakerError {
    /// Shutdown was requested; the only terminal condition
    #[error("staker cancelled")]
    Cancelled,

    /// The wallet refused to stake
    #[error(transparent)]
    Wallet(#[from] sable_wallet::WalletError),
}
