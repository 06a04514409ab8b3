//! Shared contract between the packrat client engine and the metadata
//! authority.
//!
//! Every authority operation gets an explicit, typed request/response record —
//! there is no loosely-structured payload anywhere in the core. The
//! [`MetadataAuthority`] trait is the seam between the sync engine and
//! whatever actually owns the relational metadata (the bundled SQLite
//! implementation lives in `packrat-meta`).

mod authority;
pub mod error;
mod locator;
mod manifest;
pub mod version;

pub use crate::authority::{
    CheckoutEntry, CheckoutManifest, CommitReceipt, CommitRequest, ConfirmUpload, DEFAULT_MIME_TYPE, HandshakeRequest,
    HandshakeResponse, MetadataAuthority,
};
pub use crate::locator::BlobLocator;
pub use crate::manifest::ManifestEntry;
use std::sync::Arc;

pub type AuthorityHandle = Arc<dyn MetadataAuthority + Send + Sync>;
