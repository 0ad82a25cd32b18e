//! Error types for the page storage engine.
//!
//! Every fallible operation returns a typed [`PageError`] so callers can
//! distinguish a missing page from corrupted bytes or a transient remote
//! failure. Local I/O errors never mutate persistent state; remote
//! failures are retried internally before they surface here.

use thiserror::Error;

/// Result type alias using PageError.
pub type Result<T> = std::result::Result<T, PageError>;

/// Unified error type for page storage operations.
#[derive(Error, Debug)]
pub enum PageError {
    /// The requested page id does not resolve at the given snapshot.
    #[error("Page not found: {0}")]
    NotFound(String),

    /// Checksum mismatch or a structurally invalid record. Never retried.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Local disk error on blob or manifest I/O.
    #[error("IO failure: {0}")]
    IoFailure(#[from] std::io::Error),

    /// Transient object-store failure, surfaced after retries are exhausted.
    #[error("Remote failure: {0}")]
    RemoteFailure(String),

    /// The object store reports the referenced data is absent. Non-retryable.
    #[error("Remote data gone: {0}")]
    RemoteGone(String),

    /// Lock marker creation failed; the write batch is aborted.
    #[error("Lock creation failed: {0}")]
    LockFailure(String),

    /// An API requiring prior initialization was called too early,
    /// or was called with arguments that violate its contract.
    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),
}
