//! Error types for storage and config handling.

use thiserror::Error;

/// Errors raised by [`crate::store::ByteStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing medium could not be opened or accessed at all.
    #[error("storage medium unavailable: {0}")]
    MediumUnavailable(String),

    /// An access fell outside the region owned by the store.
    #[error("access out of range: offset {offset} + len {len} exceeds capacity {capacity}")]
    OutOfRange {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Flushing the staged bytes to the medium failed.
    #[error("commit failed: {0}")]
    CommitFailed(String),
}

/// Errors raised by the config ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A stored layer's checksum did not match its bytes.
    #[error("integrity failure in {layer} config layer")]
    IntegrityFailure { layer: &'static str },

    #[error(transparent)]
    Store(#[from] StoreError),
}
