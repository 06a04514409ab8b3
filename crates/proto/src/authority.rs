//! The metadata authority contract.
//!
//! One record type per operation, validated at the boundary before any of it
//! reaches the relational store. The trait is object-safe so the engine can
//! hold an [`AuthorityHandle`](crate::AuthorityHandle) without caring whether
//! the authority is in-process or remote.

use crate::error::Result;
use crate::locator::BlobLocator;
use crate::manifest::ManifestEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Mime type recorded for assets when the uploader doesn't know better.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A client's full local manifest, offered for dedup negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub project: String,
    pub manifest: Vec<ManifestEntry>,
}

/// Which of the offered paths carry content the authority has never seen.
///
/// Paths, not hashes: the client uploads by path, the authority reasons by
/// hash. Several paths sharing one novel hash are all listed — the client is
/// free to upload the bytes once and confirm once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub required_paths: Vec<String>,
    /// Human-readable summary (checked / known / required counts).
    pub message: String,
}

impl HandshakeResponse {
    pub fn nothing_required(&self) -> bool {
        self.required_paths.is_empty()
    }
}

/// Records that a blob landed in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmUpload {
    pub hash: String,
    pub size: u64,
    pub locator: BlobLocator,
    pub mime_type: String,
}

impl ConfirmUpload {
    /// Build the confirmation for a manifest entry, deriving the canonical
    /// locator from its hash.
    pub fn for_entry(entry: &ManifestEntry) -> Self {
        Self {
            hash: entry.hash.clone(),
            size: entry.size,
            locator: BlobLocator::for_hash(&entry.hash),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
        }
    }
}

/// A full-tree snapshot to persist as an immutable commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub project: String,
    pub tag: String,
    pub message: String,
    pub author: String,
    pub manifest: Vec<ManifestEntry>,
    /// When `false` (the default and what the push flow uses), a manifest path
    /// whose hash has no confirmed asset aborts the whole commit with
    /// [`PartialCommit`](crate::error::ErrorKind::PartialCommit). When `true`,
    /// the resolved subset is committed and the receipt lists what was dropped.
    pub allow_partial: bool,
}

/// Outcome of a successful (possibly partial) commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub commit_id: i64,
    pub tag: String,
    /// Number of path→asset links persisted.
    pub linked: usize,
    /// Paths excluded because their content was never confirmed. Empty unless
    /// the request opted into partial commits.
    pub unresolved: Vec<String>,
}

/// One file of a committed snapshot, as served for checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutEntry {
    pub path: String,
    pub hash: String,
    pub size: u64,
    pub locator: BlobLocator,
}

/// The complete file manifest of one commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutManifest {
    pub project: String,
    pub tag: String,
    pub entries: Vec<CheckoutEntry>,
}

/// Typed operations the relational metadata store exposes to the core.
///
/// Implementations own Project, Asset, Commit and ProjectFile records. All
/// mutating operations are atomic: either the full effect is visible or none
/// of it is.
#[async_trait]
pub trait MetadataAuthority: Send + Sync {
    /// Dedup negotiation: which offered paths carry unknown content?
    ///
    /// An empty manifest yields an empty required list, not an error.
    async fn handshake(&self, request: HandshakeRequest) -> Result<HandshakeResponse>;

    /// Record a completed upload. Idempotent: confirming a hash that already
    /// has an asset row is a no-op, so retries and out-of-order confirmations
    /// are safe.
    async fn confirm_upload(&self, request: ConfirmUpload) -> Result<()>;

    /// Create an immutable commit snapshot, lazily creating the project on
    /// first use. Fails with [`DuplicateTag`](crate::error::ErrorKind::DuplicateTag)
    /// if the tag is already taken for the project.
    async fn commit(&self, request: CommitRequest) -> Result<CommitReceipt>;

    /// The file manifest of one committed snapshot. Unknown project or tag is
    /// [`VersionNotFound`](crate::error::ErrorKind::VersionNotFound); there are
    /// no partial results.
    async fn checkout(&self, project: &str, tag: &str) -> Result<CheckoutManifest>;

    /// All version tags of a project, newest first. Unknown projects list no
    /// tags (projects only exist once something was committed under them).
    async fn list_versions(&self, project: &str) -> Result<Vec<String>>;
}
