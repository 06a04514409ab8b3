//! Local tree fingerprinting.
//!
//! Walks a directory, prunes ignored subtrees before descending, and produces
//! one [`LocalFileRecord`] per retained file: a forward-slash relative path,
//! a streamed 256-bit BLAKE3 digest, the byte size, and the absolute path.
//! The records are ephemeral — they are regenerated on every scan and never
//! persisted anywhere.

pub mod error;
mod hash;
mod ignore;
mod walk;

pub use crate::hash::hash_file;
pub use crate::ignore::{RULE_FILE_NAME, RuleSet};
pub use crate::walk::{LocalFileRecord, ScanOutcome, SkippedFile, scan_tree};
