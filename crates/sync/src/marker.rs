//! Workspace version marker.
//!
//! A small JSON file at the workspace root recording which project/version
//! the tree was last synced to. Purely advisory: the engine never trusts it
//! for correctness (content addressing makes that unnecessary), it only uses
//! it for display and as a default project name.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Marker file name at the workspace root. The scanner's built-in junk list
/// excludes it, so it never enters a manifest.
pub const MARKER_FILE_NAME: &str = ".packrat.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMarker {
    pub project: String,
    pub tag: String,
    /// Unix timestamp of the last successful sync.
    pub synced_at: i64,
}

impl WorkspaceMarker {
    pub fn new(project: impl Into<String>, tag: impl Into<String>) -> Self {
        Self { project: project.into(), tag: tag.into(), synced_at: time::UtcDateTime::now().unix_timestamp() }
    }

    /// Read the marker at `root`, if a readable one exists. Missing or
    /// malformed markers are not errors.
    pub async fn load(root: impl AsRef<Path>) -> Option<Self> {
        let path = root.as_ref().join(MARKER_FILE_NAME);
        let contents = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&contents) {
            Ok(marker) => Some(marker),
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "ignoring unreadable workspace marker");
                None
            },
        }
    }

    /// Write (or replace) the marker at `root`.
    pub async fn write(&self, root: impl AsRef<Path>) -> Result<()> {
        let path = root.as_ref().join(MARKER_FILE_NAME);
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ErrorKind::Io(std::io::Error::other(e)))?;
        tokio::fs::write(&path, contents).await.map_err(ErrorKind::Io)?;
        Ok(())
    }
}
