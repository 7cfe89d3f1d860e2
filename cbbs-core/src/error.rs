//! Error types shared by the concurrent collections.
//!
//! These map directly onto the error kinds a lock-free container can
//! surface: an empty pop/first, a missing key, a duplicate add, or a
//! cancelled elimination-array wait. CAS failures are never represented
//! here; they are retries, not errors.

use thiserror::Error;

/// The error type returned by collection operations that can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Pop/first/last was called on an empty container.
    #[error("container is empty")]
    EmptyContainer,

    /// remove/get was called for a key that is not present.
    #[error("key not found")]
    NotFound,

    /// add was called for a key that is already present in a set.
    #[error("key already present")]
    AlreadyPresent,

    /// An elimination-array wait was interrupted by host cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// An internal invariant was violated. This should never happen in a
    /// correct build; callers should treat it as a bug report, not a
    /// recoverable condition.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// A specialized `Result` type for collection operations.
pub type Result<T> = std::result::Result<T, Error>;
