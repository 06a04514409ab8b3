//! Blob store trait.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use packrat_proto::BlobLocator;
use std::pin::Pin;

/// A stream of content bytes, in whatever chunk sizes the transport yields.
///
/// Items are `std::io::Result` so filesystem readers and network bodies plug
/// in without an adapter layer on either side.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + 'static>>;

/// Unified interface to the content-addressed blob store.
///
/// The store is keyed purely by [`BlobLocator`]; it knows nothing about
/// projects, paths or commits. Both directions stream — a whole blob is never
/// buffered in memory, and no client-side timeout is imposed, since multi-hour
/// transfers of large assets are the normal case.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the configured store (used for logging only).
    fn name(&self) -> &str;

    /// Store a blob under the locator, overwriting any previous content.
    ///
    /// `len` is the exact byte length of the stream; stores that can verify
    /// it should reject a mismatched body.
    async fn put(&self, locator: &BlobLocator, len: u64, data: ByteStream) -> Result<()>;

    /// Open a byte stream over the blob at the locator.
    async fn get(&self, locator: &BlobLocator) -> Result<ByteStream>;
}
