//! Sync plan generation.
//!
//! Reconciles a checkout manifest against local filesystem reality. Every
//! manifest entry gets exactly one [`SyncAction`]; the plan is pure data and
//! performs no I/O beyond scanning and fingerprinting — the
//! [`TransferExecutor`](crate::TransferExecutor) is what acts on it.

use crate::error::{ErrorKind, Result};
use packrat_proto::{BlobLocator, CheckoutManifest};
use packrat_scan::{RuleSet, ScanOutcome, hash_file, scan_tree};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What to do when the destination path exists with different content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Rename the existing file aside with a timestamp suffix, then acquire.
    #[default]
    Backup,
    /// Delete the existing file, then acquire.
    Overwrite,
    /// Keep the local file and abandon acquisition for that path.
    Skip,
}

impl FromStr for ConflictPolicy {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backup" => Ok(Self::Backup),
            "overwrite" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            _ => exn::bail!(ErrorKind::InvalidPolicy(s.to_string())),
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Backup => "backup",
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
        })
    }
}

/// What must happen to the existing destination file before acquisition.
///
/// Recorded independently of the acquisition method so the executor always
/// applies them in the right order: resolve the conflict first, acquire
/// second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDisposition {
    /// Destination is free (or matching); nothing to resolve.
    Untouched,
    /// Rename the existing file aside before acquiring.
    BackupExisting,
    /// Delete the existing file before acquiring.
    DeleteExisting,
}

/// Where the content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// Identical content already exists on local disk; copy it over.
    LocalCopy { source: PathBuf },
    /// Stream the blob down from the store.
    Download { locator: BlobLocator },
}

/// The decision for one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Destination already holds the right content.
    UpToDate,
    /// Destination conflicts and the policy says keep the local file.
    KeepLocal,
    /// Resolve any conflict, then acquire the content.
    Acquire { method: Acquisition, conflict: ConflictDisposition },
}

/// One planned unit of work: a manifest entry plus the decision made for it.
#[derive(Debug, Clone)]
pub struct SyncTask {
    /// Manifest-relative path (forward slashes).
    pub path: String,
    pub hash: String,
    pub size: u64,
    /// Absolute destination on local disk.
    pub destination: PathBuf,
    pub action: SyncAction,
}

impl SyncTask {
    /// Terminal tasks need no executor work.
    pub fn is_terminal(&self) -> bool {
        matches!(self.action, SyncAction::UpToDate | SyncAction::KeepLocal)
    }
}

/// A full per-file action plan for bringing a local tree to one version.
#[derive(Debug)]
pub struct SyncPlan {
    pub project: String,
    pub tag: String,
    pub tasks: Vec<SyncTask>,
}

impl SyncPlan {
    /// Tasks that will actually copy or download content.
    pub fn active(&self) -> impl Iterator<Item = &SyncTask> {
        self.tasks.iter().filter(|t| !t.is_terminal())
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}

fn destination(root: &Path, relative: &str) -> PathBuf {
    let mut dest = root.to_path_buf();
    dest.extend(relative.split('/'));
    dest
}

/// Existing content fingerprint at a destination, if anything is there.
async fn existing_content(
    by_path: &HashMap<&str, (u64, &str)>,
    relative: &str,
    dest: &Path,
) -> Option<(u64, String)> {
    if let Some((size, hash)) = by_path.get(relative) {
        return Some((*size, hash.to_string()));
    }
    // The scan can miss a file that is really there (ignored subtree,
    // unreadable during the walk). Fall back to asking the filesystem so a
    // conflict is never silently clobbered.
    let metadata = tokio::fs::metadata(dest).await.ok()?;
    if !metadata.is_file() {
        return None;
    }
    let hash = hash_file(dest).await.ok()?;
    Some((metadata.len(), hash))
}

/// Compute the per-file action plan for `manifest` against the tree at `root`.
///
/// The local root is scanned once (honoring ignore rules) to build both a
/// path-keyed view for skip/conflict decisions and a hash-keyed inventory for
/// move detection: content that already exists anywhere on local disk is
/// copied instead of downloaded. Task order follows the manifest.
pub async fn generate_plan(
    manifest: &CheckoutManifest,
    root: impl AsRef<Path>,
    policy: ConflictPolicy,
) -> Result<SyncPlan> {
    let root = root.as_ref();
    let outcome = if root.is_dir() {
        let rules = RuleSet::load(root).await.map_err(ErrorKind::scan)?;
        scan_tree(root, &rules).await.map_err(ErrorKind::scan)?
    } else {
        // Pulling into a fresh directory: nothing local, everything downloads.
        ScanOutcome::default()
    };

    let by_path: HashMap<&str, (u64, &str)> =
        outcome.files.iter().map(|f| (f.path.as_str(), (f.size, f.hash.as_str()))).collect();
    let mut by_hash: HashMap<&str, Vec<&Path>> = HashMap::new();
    for record in &outcome.files {
        by_hash.entry(record.hash.as_str()).or_default().push(record.absolute.as_path());
    }

    let mut tasks = Vec::with_capacity(manifest.entries.len());
    for entry in &manifest.entries {
        let dest = destination(root, &entry.path);
        // Size first as a cheap pre-filter; only matching sizes get a hash
        // comparison.
        let existing = existing_content(&by_path, &entry.path, &dest).await;
        let up_to_date =
            existing.as_ref().is_some_and(|(size, hash)| *size == entry.size && *hash == entry.hash);
        let action = if up_to_date {
            SyncAction::UpToDate
        } else {
            let conflict = match (&existing, policy) {
                (None, _) => ConflictDisposition::Untouched,
                (Some(_), ConflictPolicy::Skip) => {
                    tasks.push(SyncTask {
                        path: entry.path.clone(),
                        hash: entry.hash.clone(),
                        size: entry.size,
                        destination: dest,
                        action: SyncAction::KeepLocal,
                    });
                    continue;
                },
                (Some(_), ConflictPolicy::Backup) => ConflictDisposition::BackupExisting,
                (Some(_), ConflictPolicy::Overwrite) => ConflictDisposition::DeleteExisting,
            };
            // Any local path holding the right bytes is an acceptable source;
            // content is identical by construction. The destination itself is
            // excluded — its content is known to differ at this point.
            let method = by_hash
                .get(entry.hash.as_str())
                .and_then(|sources| sources.iter().find(|s| **s != dest))
                .map(|source| Acquisition::LocalCopy { source: source.to_path_buf() })
                .unwrap_or_else(|| Acquisition::Download { locator: entry.locator.clone() });
            SyncAction::Acquire { method, conflict }
        };
        tasks.push(SyncTask {
            path: entry.path.clone(),
            hash: entry.hash.clone(),
            size: entry.size,
            destination: dest,
            action,
        });
    }

    tracing::debug!(
        project = %manifest.project,
        tag = %manifest.tag,
        total = tasks.len(),
        active = tasks.iter().filter(|t| !t.is_terminal()).count(),
        "sync plan generated"
    );
    Ok(SyncPlan { project: manifest.project.clone(), tag: manifest.tag.clone(), tasks })
}
