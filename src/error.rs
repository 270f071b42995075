//! Storage error kinds
//!
//! Every failure the engine can classify is one of these kinds. The
//! variants travel inside `anyhow` chains so call sites keep their
//! contextual messages, while callers that need to branch on the kind
//! (or tests asserting a specific failure) downcast with
//! `err.downcast_ref::<Error>()`.

use thiserror::Error;

/// Classified storage failures
#[derive(Debug, Error)]
pub enum Error {
    /// Object, ref, index entry, or path absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed header, bad magic, size mismatch, zlib failure,
    /// bad padding, or bad checksum
    #[error("corrupt: {0}")]
    Corrupt(String),

    /// Version or format the engine knows about but does not read
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A short ref name that cannot be expanded
    #[error("invalid ref: {0}")]
    InvalidRef(String),

    /// Malformed caller-supplied data (bad hex, duplicate commit
    /// header, out-of-range field)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Cyclic symbolic refs or delta chains
    #[error("depth exceeded: {0}")]
    DepthExceeded(String),

    /// Underlying filesystem error not matching the kinds above
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
