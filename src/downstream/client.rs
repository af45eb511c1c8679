// Downstream HTTP client.
// Issues GET requests and hands back the status plus the fully read body.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::{
    Client,
    header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT},
};
use url::Url;

use crate::error::{FetchError, Result};

/// A completed response: status plus the whole body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Something that can perform one GET round trip.
pub trait Transport: Send + Sync + 'static {
    /// Perform a GET. Resolves only after headers and body are received.
    fn get(&self, url: Url) -> BoxFuture<'static, Result<RawResponse>>;
}

/// reqwest-backed transport for the downstream money service.
#[derive(Debug, Clone)]
pub struct DownstreamClient {
    client: Client,
}

impl DownstreamClient {
    /// Create a client with JSON accept and user agent headers.
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("monofetch/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(FetchError::from)?;

        Ok(Self { client })
    }
}

impl Transport for DownstreamClient {
    fn get(&self, url: Url) -> BoxFuture<'static, Result<RawResponse>> {
        let client = self.client.clone();
        async move {
            tracing::debug!(%url, "sending GET");
            let response = client.get(url).send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            tracing::debug!(status, bytes = body.len(), "response received");
            Ok(RawResponse::new(status, body.to_vec()))
        }
        .boxed()
    }
}
