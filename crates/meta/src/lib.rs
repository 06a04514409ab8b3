//! SQLite-backed metadata authority.
//!
//! This crate owns the relational side of the system: Project, Asset, Commit
//! and ProjectFile records. Assets are content-addressed and global — one row
//! per unique content hash no matter how many projects or paths reference it.
//! Commits are immutable full-tree snapshots created atomically; either a
//! commit and all its file links become visible together, or nothing does.
//!
//! [`SqliteAuthority`] implements the
//! [`MetadataAuthority`](packrat_proto::MetadataAuthority) contract from
//! `packrat-proto`, so engine code never depends on this crate directly.

mod authority;
mod db;
pub mod error;
mod models;

pub use crate::authority::SqliteAuthority;
pub use crate::db::Database;
