//! Deny rules deciding which names never enter a manifest.
//!
//! A rule set is the built-in junk denylist (editor/OS artifacts, VCS and
//! cache directories) plus whatever the user declared in the project-root
//! rule file. Three rule shapes exist:
//!
//! - exact filename match (`Thumbs.db`)
//! - glob wildcard over the filename (`*.tmp`, `render_??.exr`)
//! - folder rule, declared with a trailing slash (`caches/`), matching a
//!   directory name anywhere in the tree
//!
//! The walker consults [`RuleSet::is_ignored`] *before* descending into a
//! directory, so an ignored subtree is never read at all.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;

/// Name of the per-project rule file, one pattern per line, `#` comments.
pub const RULE_FILE_NAME: &str = ".packratignore";

/// Names nobody ever wants in a versioned asset tree. Applied to both files
/// and directories.
const BUILTIN_JUNK: &[&str] = &[
    // The workspace version marker is engine state, never content.
    ".packrat.json",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    ".venv",
    "node_modules",
];

/// Compiled deny rules.
#[derive(Debug)]
pub struct RuleSet {
    exact: HashSet<String>,
    folders: HashSet<String>,
    wildcards: GlobSet,
}

impl RuleSet {
    /// Just the built-in junk denylist.
    pub fn built_in() -> Self {
        Self::from_patterns(std::iter::empty::<&str>()).expect("builtin rules always compile")
    }

    /// Built-in rules plus the project's rule file, if one exists at `root`.
    /// A missing rule file is not an error; an unreadable one is.
    pub async fn load(root: impl AsRef<Path>) -> Result<Self> {
        let rule_file = root.as_ref().join(RULE_FILE_NAME);
        match tokio::fs::read_to_string(&rule_file).await {
            Ok(contents) => Self::from_patterns(contents.lines()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::built_in()),
            Err(err) => Err(ErrorKind::Io(err).into()),
        }
    }

    /// Compile built-in junk plus user patterns. Blank lines and `#` comments
    /// are dropped; a trailing `/` marks a folder rule; anything containing
    /// glob metacharacters becomes a wildcard rule; the rest match exactly.
    pub fn from_patterns<P: AsRef<str>>(patterns: impl IntoIterator<Item = P>) -> Result<Self> {
        let mut exact: HashSet<String> = BUILTIN_JUNK.iter().map(|s| s.to_string()).collect();
        // Builtins prune directories too (.git, __pycache__, ...).
        let mut folders: HashSet<String> = exact.clone();
        let mut wildcards = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            if let Some(folder) = pattern.strip_suffix('/') {
                folders.insert(folder.to_string());
            } else if pattern.contains(['*', '?', '[']) {
                let glob = Glob::new(pattern).or_raise(|| ErrorKind::InvalidPattern(pattern.to_string()))?;
                wildcards.add(glob);
            } else {
                exact.insert(pattern.to_string());
            }
        }
        let wildcards = wildcards.build().or_raise(|| ErrorKind::InvalidPattern("<ruleset>".to_string()))?;
        Ok(Self { exact, folders, wildcards })
    }

    /// Should this name be excluded from the scan?
    ///
    /// `is_dir` additionally enables folder rules, which only ever match
    /// directory segments.
    pub fn is_ignored(&self, name: &str, is_dir: bool) -> bool {
        if self.exact.contains(name) {
            return true;
        }
        if is_dir && self.folders.contains(name) {
            return true;
        }
        self.wildcards.is_match(name)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::built_in()
    }
}
