use crate::error::{ErrorKind, Result};
use crate::hash::hash_file;
use crate::ignore::RuleSet;
use packrat_proto::ManifestEntry;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// One retained file of a scanned tree.
///
/// The manifest half (relative path, hash, size) is what goes over the wire;
/// the absolute path is what the transfer layer reads bytes from. Derefs to
/// [`ManifestEntry`] so records can be used wherever an entry is expected.
#[derive(Debug, Clone)]
pub struct LocalFileRecord {
    manifest: ManifestEntry,
    pub absolute: PathBuf,
}

impl LocalFileRecord {
    pub fn new(manifest: ManifestEntry, absolute: impl Into<PathBuf>) -> Self {
        Self { manifest, absolute: absolute.into() }
    }

    pub fn manifest(&self) -> &ManifestEntry {
        &self.manifest
    }

    pub fn into_manifest(self) -> ManifestEntry {
        self.manifest
    }
}

impl Deref for LocalFileRecord {
    type Target = ManifestEntry;
    fn deref(&self) -> &ManifestEntry {
        &self.manifest
    }
}

/// A file the scan could not fingerprint. Never fatal to the scan.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything a scan produced: the retained records (sorted by relative path,
/// so repeated scans of identical trees are byte-for-byte comparable) plus
/// whatever had to be skipped.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<LocalFileRecord>,
    pub skipped: Vec<SkippedFile>,
}

impl ScanOutcome {
    /// The wire manifest: (path, hash, size) for every retained file.
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.files.iter().map(|f| f.manifest().clone()).collect()
    }
}

/// Walk `root`, pruning ignored subtrees before descending, and fingerprint
/// every retained file.
///
/// Per-file failures (unreadable, vanished mid-scan, non-UTF-8 name) are
/// recorded in [`ScanOutcome::skipped`] and logged; only an unusable root or
/// an unreadable top-level directory aborts the scan.
pub async fn scan_tree(root: impl AsRef<Path>, rules: &RuleSet) -> Result<ScanOutcome> {
    let root = root.as_ref();
    if !root.is_dir() {
        exn::bail!(ErrorKind::InvalidRoot(root.to_path_buf()));
    }
    tracing::info!(root = %root.display(), "scanning directory tree");

    let mut outcome = ScanOutcome::default();
    let mut stack = vec![root.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut reader = match tokio::fs::read_dir(&current).await {
            Ok(reader) => reader,
            Err(err) if current == root => return Err(ErrorKind::Io(err).into()),
            Err(err) => {
                tracing::warn!(path = %current.display(), %err, "skipping unreadable directory");
                outcome.skipped.push(SkippedFile { path: current, reason: err.to_string() });
                continue;
            },
        };

        // Collect and sort so walk order (and therefore skip reporting) is
        // independent of filesystem enumeration order.
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(ErrorKind::Io)? {
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                outcome.skipped.push(SkippedFile { path, reason: "non-UTF-8 file name".to_string() });
                continue;
            };
            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(err) => {
                    outcome.skipped.push(SkippedFile { path, reason: err.to_string() });
                    continue;
                },
            };
            if file_type.is_dir() {
                if rules.is_ignored(&name, true) {
                    tracing::debug!(path = %path.display(), "pruned ignored directory");
                } else {
                    stack.push(path);
                }
                continue;
            }
            // Symlinks and other non-regular entries are dropped silently,
            // same as a broken link would be.
            if !file_type.is_file() || rules.is_ignored(&name, false) {
                continue;
            }
            match fingerprint(root, &path).await {
                Ok(record) => outcome.files.push(record),
                Err(reason) => {
                    tracing::warn!(path = %path.display(), reason, "skipping inaccessible file");
                    outcome.skipped.push(SkippedFile { path, reason });
                },
            }
        }
    }

    outcome.files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::info!(files = outcome.files.len(), skipped = outcome.skipped.len(), "scan complete");
    Ok(outcome)
}

/// Size, streamed hash, and forward-slash relative path for one file.
async fn fingerprint(root: &Path, path: &Path) -> std::result::Result<LocalFileRecord, String> {
    let relative = relative_slash_path(root, path).ok_or_else(|| "path escapes scan root".to_string())?;
    let metadata = tokio::fs::metadata(path).await.map_err(|e| e.to_string())?;
    let hash = hash_file(path).await.map_err(|e| e.to_string())?;
    Ok(LocalFileRecord::new(ManifestEntry::new(relative, hash, metadata.len()), path))
}

/// Relative path with `/` separators regardless of host conventions.
///
/// Every component was already checked for UTF-8 while walking, so a `None`
/// here means the path isn't under `root` at all.
fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let segments: Option<Vec<&str>> =
        path.strip_prefix(root).ok()?.components().map(|c| c.as_os_str().to_str()).collect();
    Some(segments?.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::RULE_FILE_NAME;

    async fn write(root: &Path, rel: &str, data: &[u8]) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, data).await.unwrap();
    }

    #[tokio::test]
    async fn test_relative_forward_slash_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "textures/wood/oak.png", b"oak").await;
        write(dir.path(), "scene.blend", b"scene").await;
        let outcome = scan_tree(dir.path(), &RuleSet::built_in()).await.unwrap();
        let paths: Vec<_> = outcome.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["scene.blend", "textures/wood/oak.png"]);
    }

    #[tokio::test]
    async fn test_records_carry_size_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.bin", b"payload").await;
        let outcome = scan_tree(dir.path(), &RuleSet::built_in()).await.unwrap();
        let record = &outcome.files[0];
        assert_eq!(record.size, 7);
        assert_eq!(record.hash, blake3::hash(b"payload").to_hex().to_string());
        assert_eq!(record.absolute, dir.path().join("a.bin"));
    }

    #[tokio::test]
    async fn test_identical_content_hashes_identically() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "one/copy.bin", b"same bytes").await;
        write(dir.path(), "two/copy.bin", b"same bytes").await;
        let outcome = scan_tree(dir.path(), &RuleSet::built_in()).await.unwrap();
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.files[0].hash, outcome.files[1].hash);
    }

    #[tokio::test]
    async fn test_ignored_directories_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".git/objects/blob", b"vcs").await;
        write(dir.path(), "__pycache__/mod.pyc", b"cache").await;
        write(dir.path(), "kept.txt", b"kept").await;
        let outcome = scan_tree(dir.path(), &RuleSet::built_in()).await.unwrap();
        let paths: Vec<_> = outcome.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["kept.txt"]);
    }

    #[tokio::test]
    async fn test_rule_file_patterns_apply() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), RULE_FILE_NAME, b"*.tmp\nrenders/\n").await;
        write(dir.path(), "work.tmp", b"scratch").await;
        write(dir.path(), "renders/final.exr", b"frame").await;
        write(dir.path(), "kept.txt", b"kept").await;
        let rules = RuleSet::load(dir.path()).await.unwrap();
        let outcome = scan_tree(dir.path(), &rules).await.unwrap();
        let paths: Vec<_> = outcome.files.iter().map(|f| f.path.as_str()).collect();
        // The rule file itself is still a regular file and gets scanned.
        assert_eq!(paths, vec![RULE_FILE_NAME, "kept.txt"]);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_tree(dir.path().join("absent"), &RuleSet::built_in()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidRoot(_)));
    }

    #[tokio::test]
    async fn test_empty_tree_scans_clean() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = scan_tree(dir.path(), &RuleSet::built_in()).await.unwrap();
        assert!(outcome.files.is_empty());
        assert!(outcome.skipped.is_empty());
    }
}
