//! Error types for the core primitives.

use thiserror::Error;

/// Errors produced while decoding or manipulating core structures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Wire decoding failed
    #[error("decode error: {0}")]
    Decode(String),

    /// A compact size or integer was not in canonical form
    #[error("non-canonical encoding: {0}")]
    NonCanonical(String),

    /// Script manipulation failed
    #[error("script error: {0}")]
    Script(String),

    /// Monetary amount outside the valid range
    #[error("amount out of range")]
    AmountRange,
}

/// A specialized `Result` type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
