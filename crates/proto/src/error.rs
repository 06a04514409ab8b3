//! Authority Contract Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. These are the errors the [`MetadataAuthority`](crate::MetadataAuthority)
//! trait is allowed to surface; implementation-internal failures get folded
//! into [`ErrorKind::Authority`] at the boundary.

use derive_more::{Display, Error};

/// A contract error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for authority operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Tag failed normalization (empty after trimming).
    #[display("invalid version tag: {_0:?}")]
    InvalidTag(#[error(not(source))] String),
    /// Tag already exists for the project; detectable before any transfer.
    #[display("version {_0:?} already exists for this project")]
    DuplicateTag(#[error(not(source))] String),
    /// No commit matches the requested project/tag pair.
    #[display("no commit found for {project}:{tag}")]
    VersionNotFound { project: String, tag: String },
    /// The submitted snapshot references content never confirmed as uploaded.
    /// Carries every unresolved path; nothing was persisted.
    #[display("commit references unconfirmed content: {}", _0.join(", "))]
    PartialCommit(#[error(not(source))] Vec<String>),
    /// A request record failed boundary validation.
    #[display("invalid request: {_0}")]
    InvalidRequest(#[error(not(source))] &'static str),
    /// The authority backend failed while servicing the operation.
    #[display("authority failure during {_0}")]
    Authority(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Authority(_))
    }
}
