//! Streaming client for the content-addressed blob store.
//!
//! The store itself is an external collaborator reachable over a plain
//! PUT/GET interface keyed by [`BlobLocator`](packrat_proto::BlobLocator);
//! this crate provides the [`BlobStore`] trait the transfer executor works
//! against, the [`HttpBlobStore`] production client, and (behind the `mock`
//! feature) an in-memory store for tests.

pub mod error;
mod http;
#[cfg(feature = "mock")]
mod mock;
mod store;

use std::sync::Arc;

pub use crate::http::HttpBlobStore;
#[cfg(feature = "mock")]
pub use crate::mock::MockBlobStore;
pub use crate::store::{BlobStore, ByteStream};

/// Shared handle to a blob store implementation.
pub type BlobHandle = Arc<dyn BlobStore + Send + Sync>;
