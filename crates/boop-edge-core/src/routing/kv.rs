//! Cloudflare KV routing store.
//!
//! Reads the namespace the deploy pipeline writes to, through the KV REST
//! API. A 404 means the key is absent; any other failure makes the routing
//! table unavailable for this request.

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, StatusCode};
use tracing::warn;

use super::RoutingStore;
use crate::config::{KvRoutingConfig, UpstreamTimeouts};
use crate::error::{EdgeError, EdgeResult};

/// Cloudflare REST API base.
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Characters left unescaped in a key path segment; `/` and `:` are escaped.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Read-only client of a Cloudflare KV namespace.
#[derive(Debug, Clone)]
pub struct KvRoutingStore {
    client: Client,
    config: KvRoutingConfig,
}

impl KvRoutingStore {
    /// Create a KV store client with the given upstream timeouts.
    pub fn new(config: KvRoutingConfig, timeouts: UpstreamTimeouts) -> EdgeResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .build()
            .map_err(|e| EdgeError::Configuration(format!("cannot build KV client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a KV store client around an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, config: KvRoutingConfig) -> Self {
        Self { client, config }
    }

    fn value_url(&self, key: &str) -> String {
        format!(
            "{}/accounts/{}/storage/kv/namespaces/{}/values/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_id,
            self.config.namespace_id,
            utf8_percent_encode(key, KEY_SEGMENT),
        )
    }
}

#[async_trait]
impl RoutingStore for KvRoutingStore {
    async fn get(&self, key: &str) -> EdgeResult<Option<String>> {
        let response = self
            .client
            .get(self.value_url(key))
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| {
                warn!(key, error = %e, "routing store request failed");
                EdgeError::RoutingUnavailable(e.to_string())
            })?;

        match response.status() {
            StatusCode::OK => {
                let value = response
                    .text()
                    .await
                    .map_err(|e| EdgeError::RoutingUnavailable(e.to_string()))?;
                Ok(Some(value))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                warn!(key, %status, "routing store returned unexpected status");
                Err(EdgeError::RoutingUnavailable(format!(
                    "kv read returned {status}"
                )))
            }
        }
    }
}
