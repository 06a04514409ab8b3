//! Version tag algebra.
//!
//! Pure functions over tag strings; no I/O, no state. Tags are linear and
//! last-write-wins per project — there is deliberately no ordering or
//! precedence logic here beyond "does this tag already exist".

use crate::error::{ErrorKind, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Tag handed out when a project has no history yet.
pub const INITIAL_TAG: &str = "v1.0";

static TRAILING_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)$").unwrap());

/// Trim whitespace and ensure the leading version marker.
///
/// `"1.0"` becomes `"v1.0"`; an already-marked tag (either case) is returned
/// trimmed but otherwise untouched. Empty input stays empty — validation
/// rejects it later.
pub fn normalize(tag: &str) -> String {
    let tag = tag.trim();
    if tag.is_empty() || tag.starts_with('v') || tag.starts_with('V') {
        tag.to_string()
    } else {
        format!("v{tag}")
    }
}

/// Propose the next tag after `last`.
///
/// The trailing run of digits is incremented numerically, preserving the
/// prefix: `v1.9` → `v1.10`, `v2` → `v3`. A tag with no trailing digits gets
/// `.1` appended; no previous tag at all yields [`INITIAL_TAG`].
pub fn increment(last: Option<&str>) -> String {
    let Some(last) = last.map(str::trim).filter(|t| !t.is_empty()) else {
        return INITIAL_TAG.to_string();
    };
    match TRAILING_DIGITS.captures(last) {
        Some(caps) => {
            let digits = caps.get(1).expect("regex has one capture group");
            // Saturate rather than wrap on absurd input like 340 digits of 9.
            let next = digits.as_str().parse::<u64>().map(|n| n + 1).unwrap_or(u64::MAX);
            format!("{}{next}", &last[..digits.start()])
        },
        None => format!("{last}.1"),
    }
}

/// Normalize `tag` and reject it if it collides with an existing tag.
///
/// This runs on the client before any upload begins, so a doomed push fails
/// before wasting transfer. The authority enforces the same uniqueness on its
/// side regardless.
pub fn validate(tag: &str, existing: &[String]) -> Result<String> {
    let normalized = normalize(tag);
    if normalized.is_empty() {
        exn::bail!(ErrorKind::InvalidTag(tag.to_string()));
    }
    if existing.iter().any(|t| t == &normalized) {
        exn::bail!(ErrorKind::DuplicateTag(normalized));
    }
    Ok(normalized)
}
