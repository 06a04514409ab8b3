//! Sync Engine Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Errors from the scanner, the metadata authority and the
//! blob store are folded in as children so their own frames stay visible.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// Per-file transfer failures are NOT errors at this level — they are reported
/// through [`TransferReport`](crate::TransferReport) so one bad file never
/// aborts the rest of a batch.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Scanning the local tree failed outright.
    #[display("local scan failed")]
    Scan,
    /// The metadata authority rejected or failed an operation.
    #[display("metadata authority operation failed")]
    Authority,
    /// The blob store failed an operation outside per-task isolation.
    #[display("blob store operation failed")]
    Blob,
    /// Underlying I/O error.
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Post-transfer verification found the wrong byte count or hash. The
    /// offending file is left on disk for inspection.
    #[display("integrity check failed for {path}: {detail}")]
    Integrity { path: String, detail: String },
    /// One or more uploads failed, so the push was aborted before commit.
    /// Uncommitted partial state is safer than a commit referencing missing
    /// content.
    #[display("{_0} upload(s) failed; commit aborted")]
    UploadFailed(#[error(not(source))] usize),
    /// The operation was cancelled before completing.
    #[display("operation cancelled")]
    Cancelled,
    /// A conflict policy string didn't name a known policy.
    #[display("unknown conflict policy: {_0:?}")]
    InvalidPolicy(#[error(not(source))] String),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Fold a scanner error in as a child frame.
    #[track_caller]
    pub fn scan(err: packrat_scan::error::Error) -> Error {
        err.raise(ErrorKind::Scan)
    }

    /// Fold an authority contract error in as a child frame.
    #[track_caller]
    pub fn authority(err: packrat_proto::error::Error) -> Error {
        err.raise(ErrorKind::Authority)
    }

    /// Fold a blob store error in as a child frame.
    #[track_caller]
    pub fn blob(err: packrat_blob::error::Error) -> Error {
        err.raise(ErrorKind::Blob)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Blob | Self::UploadFailed(_))
    }
}
