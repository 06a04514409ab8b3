//! Blob Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use packrat_proto::BlobLocator;

/// A blob store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for blob operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No blob exists at the locator.
    #[display("blob not found: {_0}")]
    NotFound(#[error(not(source))] BlobLocator),
    /// Network-related error (connection refused, reset mid-stream, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The store accepted the request but reported a failure.
    #[display("blob store error: {_0}")]
    Backend(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Backend(_))
    }
}
