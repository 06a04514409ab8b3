use serde::{Deserialize, Serialize};

/// One (path, hash, size) triple of a manifest.
///
/// Paths are always relative to the tree root and use forward-slash separators
/// regardless of the host platform, so manifests compare equal across
/// operating systems. The hash is a 256-bit BLAKE3 digest in lowercase hex and
/// is the sole dedup key — the path only says where the bytes belong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub hash: String,
    pub size: u64,
}

impl ManifestEntry {
    pub fn new(path: impl Into<String>, hash: impl Into<String>, size: u64) -> Self {
        Self { path: path.into(), hash: hash.into(), size }
    }
}
