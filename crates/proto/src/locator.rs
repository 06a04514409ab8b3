use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Address of a blob in the content store.
///
/// Locators are derived from the content hash, so identical bytes always land
/// at the same location regardless of which project or path referenced them.
/// The store treats the locator as an opaque request path.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobLocator(String);

impl BlobLocator {
    /// Derive the canonical locator for a content hash (lowercase hex digest).
    pub fn for_hash(hash: impl AsRef<str>) -> Self {
        Self(format!("/blobs/{}", hash.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BlobLocator {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}
