//! HTTP client for the blob store's PUT/GET interface.

use crate::error::{ErrorKind, Result};
use crate::store::{BlobStore, ByteStream};
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use packrat_proto::BlobLocator;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client, StatusCode};

/// Blob store reachable over plain HTTP.
///
/// Locators are absolute paths (`/blobs/<hash>`), so the request URL is just
/// the endpoint with the locator appended. The client deliberately sets no
/// request timeout: a multi-gigabyte PUT on a quiet LAN is expected to run
/// for as long as it takes, and connection-level failures still surface as
/// errors from the transport.
pub struct HttpBlobStore {
    name: String,
    endpoint: String,
    client: Client,
}

impl HttpBlobStore {
    /// Create a client for the store at `endpoint` (e.g. `http://nas:9000`).
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .no_proxy()
            .build()
            .or_raise(|| ErrorKind::Backend("failed to build HTTP client".to_string()))?;
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Ok(Self { name: "http".to_string(), endpoint, client })
    }

    fn url(&self, locator: &BlobLocator) -> String {
        format!("{}{}", self.endpoint, locator.as_str())
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, locator: &BlobLocator, len: u64, data: ByteStream) -> Result<()> {
        let response = self
            .client
            .put(self.url(locator))
            .header(CONTENT_LENGTH, len)
            .body(Body::wrap_stream(data))
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("PUT {locator}")))?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                tracing::debug!(store = %self.name, %locator, len, "blob stored");
                Ok(())
            },
            status => exn::bail!(ErrorKind::Backend(format!("PUT {locator} returned {status}"))),
        }
    }

    async fn get(&self, locator: &BlobLocator) -> Result<ByteStream> {
        let response = self
            .client
            .get(self.url(locator))
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("GET {locator}")))?;
        match response.status() {
            StatusCode::OK => {},
            StatusCode::NOT_FOUND => exn::bail!(ErrorKind::NotFound(locator.clone())),
            status => exn::bail!(ErrorKind::Backend(format!("GET {locator} returned {status}"))),
        }
        Ok(Box::pin(response.bytes_stream().map_err(std::io::Error::other)))
    }
}
