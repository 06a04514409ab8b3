//! In-memory blob store for testing.

use crate::error::{ErrorKind, Result};
use crate::store::{BlobStore, ByteStream};
use async_trait::async_trait;
use bytes::Bytes;
use exn::ResultExt;
use futures::TryStreamExt;
use packrat_proto::BlobLocator;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// In-memory blob store for testing.
///
/// Blobs live in a `HashMap` behind a [`RwLock`], so all trait methods can
/// operate on `&self` without external synchronisation. Ideal for unit tests
/// that need a [`BlobStore`] without network dependencies.
pub struct MockBlobStore {
    name: String,
    storage: RwLock<HashMap<String, Vec<u8>>>,
    rejected: HashSet<String>,
}

impl MockBlobStore {
    /// Create a mock store pre-populated with blobs, keyed by locator.
    pub fn with_blobs(blobs: impl IntoIterator<Item = (BlobLocator, impl Into<Vec<u8>>)>) -> Self {
        let map = blobs.into_iter().map(|(locator, data)| (locator.as_str().to_string(), data.into())).collect();
        Self { name: "mock".to_string(), storage: RwLock::new(map), rejected: HashSet::new() }
    }

    /// Make every `put` against the given locator fail with a backend error.
    pub fn rejecting_put(mut self, locator: &BlobLocator) -> Self {
        self.rejected.insert(locator.as_str().to_string());
        self
    }

    /// Replace a stored blob's bytes without touching its locator.
    ///
    /// This is how integrity tests simulate store-side corruption: swap in
    /// same-length garbage so the size check passes but the hash check must
    /// not.
    pub async fn poison(&self, locator: &BlobLocator, data: impl Into<Vec<u8>>) {
        self.storage.write().await.insert(locator.as_str().to_string(), data.into());
    }

    /// The raw bytes currently stored under a locator, if any.
    pub async fn blob(&self, locator: &BlobLocator) -> Option<Vec<u8>> {
        self.storage.read().await.get(locator.as_str()).cloned()
    }

    /// Number of blobs currently stored.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        let blobs: [(BlobLocator, Vec<u8>); 0] = [];
        Self::with_blobs(blobs)
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, locator: &BlobLocator, len: u64, data: ByteStream) -> Result<()> {
        if self.rejected.contains(locator.as_str()) {
            exn::bail!(ErrorKind::Backend(format!("injected failure for {locator}")));
        }
        let mut bytes = Vec::new();
        let mut data = data;
        while let Some(chunk) =
            data.try_next().await.or_raise(|| ErrorKind::Network(format!("PUT {locator}")))?
        {
            bytes.extend_from_slice(&chunk);
        }
        if bytes.len() as u64 != len {
            exn::bail!(ErrorKind::Backend(format!(
                "PUT {locator} declared {len} bytes but sent {}",
                bytes.len()
            )));
        }
        self.storage.write().await.insert(locator.as_str().to_string(), bytes);
        Ok(())
    }

    async fn get(&self, locator: &BlobLocator) -> Result<ByteStream> {
        let data = self
            .storage
            .read()
            .await
            .get(locator.as_str())
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(locator.clone())))?;
        Ok(Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) })))
    }
}
