//! Scanner Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Only failures that sink the whole scan live here —
//! per-file problems are reported softly through
//! [`SkippedFile`](crate::SkippedFile) instead.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A scan error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The scan root doesn't exist or isn't a directory.
    #[display("not a scannable directory: {}", _0.display())]
    InvalidRoot(#[error(not(source))] PathBuf),
    /// An ignore pattern failed to compile as a glob.
    #[display("invalid ignore pattern: {_0:?}")]
    InvalidPattern(#[error(not(source))] String),
    /// Underlying I/O error.
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
