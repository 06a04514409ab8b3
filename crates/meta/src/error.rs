//! Metadata Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. These cover the connection/migration layer only; the
//! authority operations speak the contract error vocabulary from
//! `packrat-proto` instead.

use derive_more::{Display, Error};

/// A metadata store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
