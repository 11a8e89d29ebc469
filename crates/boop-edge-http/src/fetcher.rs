//! Object store download client.
//!
//! One GET per call, no retries, no interpretation of the status: the
//! gateway decides what a 404 or a 401 means.

use std::fmt;

use async_trait::async_trait;
use boop_edge_core::config::UpstreamTimeouts;
use boop_edge_core::{EdgeError, EdgeResult, UpstreamAccess};
use http::header::{ACCEPT_ENCODING, AUTHORIZATION};
use http::{HeaderMap, HeaderValue, StatusCode};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;

use crate::body::EdgeResponseBody;

/// Characters left unescaped in an object key; `/` separates key segments.
const OBJECT_KEY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Raw upstream answer for one key.
pub struct UpstreamResponse {
    /// Upstream status.
    pub status: StatusCode,
    /// Upstream headers, unfiltered.
    pub headers: HeaderMap,
    /// Upstream body, not yet read.
    pub body: EdgeResponseBody,
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers.len())
            .finish_non_exhaustive()
    }
}

/// Fetches one object key from the store.
#[async_trait]
pub trait ObjectFetcher: Send + Sync + fmt::Debug {
    /// Perform a single GET for `key`.
    ///
    /// Transport failures are errors; every HTTP status, including 404, is a
    /// successful return.
    async fn fetch(
        &self,
        key: &str,
        accept_encoding: Option<&HeaderValue>,
        access: &UpstreamAccess,
    ) -> EdgeResult<UpstreamResponse>;
}

/// Backblaze B2 native download API (`{base}/file/{bucket}/{key}`).
#[derive(Debug, Clone)]
pub struct B2ObjectFetcher {
    client: Client,
    bucket: String,
}

impl B2ObjectFetcher {
    /// Create a fetcher with its own HTTP client.
    ///
    /// The client never decompresses: encoded bodies pass through with their
    /// `content-encoding` intact.
    pub fn new(bucket: impl Into<String>, timeouts: UpstreamTimeouts) -> EdgeResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .build()
            .map_err(|e| EdgeError::Configuration(format!("cannot build download client: {e}")))?;
        Ok(Self::with_client(client, bucket))
    }

    /// Create a fetcher around an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Download URL of `key` under `base`.
    #[must_use]
    pub fn download_url(&self, base: &str, key: &str) -> String {
        format!(
            "{}/file/{}/{}",
            base.trim_end_matches('/'),
            utf8_percent_encode(&self.bucket, OBJECT_KEY),
            utf8_percent_encode(key, OBJECT_KEY),
        )
    }
}

#[async_trait]
impl ObjectFetcher for B2ObjectFetcher {
    async fn fetch(
        &self,
        key: &str,
        accept_encoding: Option<&HeaderValue>,
        access: &UpstreamAccess,
    ) -> EdgeResult<UpstreamResponse> {
        let mut request = self.client.get(self.download_url(access.base_url(), key));
        if let Some(value) = accept_encoding {
            request = request.header(ACCEPT_ENCODING, value.clone());
        }
        if let Some(token) = access.token() {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request.send().await.map_err(classify_upstream_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = EdgeResponseBody::from_stream(response.bytes_stream());

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify_upstream_error(err: reqwest::Error) -> EdgeError {
    if err.is_timeout() {
        EdgeError::UpstreamTimeout
    } else {
        EdgeError::UpstreamUnavailable(err.without_url().to_string())
    }
}
