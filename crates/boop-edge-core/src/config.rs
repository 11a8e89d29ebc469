//! Edge configuration.
//!
//! All configuration is driven by environment variables, read once at
//! startup. [`EdgeConfig::from_env`] never fails; the subsets needed by each
//! component are validated on demand ([`EdgeConfig::storage`],
//! [`EdgeConfig::kv_routing`]) so a misconfigured process can still start and
//! answer with a generic 500 instead of crash-looping.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{EdgeError, EdgeResult};

/// Default Backblaze B2 account authorization endpoint.
pub const DEFAULT_AUTH_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";

/// Which routing store backend the server reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingBackend {
    /// Cloudflare KV namespace written by the deploy pipeline.
    #[default]
    Kv,
    /// JSON snapshot loaded into memory at startup.
    File,
}

impl RoutingBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kv" => Some(Self::Kv),
            "file" | "memory" => Some(Self::File),
            _ => None,
        }
    }
}

/// Edge server configuration.
///
/// # Examples
///
/// ```
/// use boop_edge_core::config::EdgeConfig;
///
/// let config = EdgeConfig::builder()
///     .download_base(Some("https://f000.backblazeb2.com".to_owned()))
///     .bucket_name(Some("sites".to_owned()))
///     .build();
/// assert!(config.storage().is_ok());
/// ```
#[derive(Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct EdgeConfig {
    /// Bind address (e.g. `"0.0.0.0:8787"`).
    #[builder(default = String::from("0.0.0.0:8787"))]
    pub listen: String,

    /// Root domain used to derive subdomain labels (e.g. `"boop.cat"`).
    #[builder(default)]
    pub root_domain: Option<String>,

    /// Public download base URL of the object store.
    #[builder(default)]
    pub download_base: Option<String>,

    /// Bucket holding deployment files.
    #[builder(default)]
    pub bucket_name: Option<String>,

    /// Static key ID for authenticated access.
    #[builder(default)]
    pub key_id: Option<String>,

    /// Static application key for authenticated access.
    #[serde(skip_serializing)]
    #[builder(default)]
    pub app_key: Option<String>,

    /// Account authorization endpoint.
    #[builder(default = String::from(DEFAULT_AUTH_URL))]
    pub auth_url: String,

    /// Local validity window of a fetched credential, in seconds.
    #[builder(default = 43_200)]
    pub auth_ttl_secs: u64,

    /// Refresh a credential this many seconds before it expires.
    #[builder(default = 300)]
    pub auth_refresh_margin_secs: u64,

    /// Connect timeout for every upstream call, in seconds.
    #[builder(default = 5)]
    pub connect_timeout_secs: u64,

    /// Per-read timeout for every upstream call, in seconds.
    #[builder(default = 30)]
    pub read_timeout_secs: u64,

    /// Routing store backend.
    #[builder(default)]
    pub routing_backend: RoutingBackend,

    /// Cloudflare account owning the KV namespace.
    #[builder(default)]
    pub cf_account_id: Option<String>,

    /// KV namespace holding `host:*` and `current:*` keys.
    #[builder(default)]
    pub cf_kv_namespace_id: Option<String>,

    /// Read-scoped Cloudflare API token.
    #[serde(skip_serializing)]
    #[builder(default)]
    pub cf_api_token: Option<String>,

    /// Path of the JSON routing snapshot for the `file` backend.
    #[builder(default)]
    pub routing_file: Option<String>,

    /// Value of the `server` and `x-boop-host` response headers.
    #[builder(default = String::from("boop.cat"))]
    pub server_name: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Log output format: `"text"` or `"json"`.
    #[builder(default = String::from("text"))]
    pub log_format: String,
}

impl fmt::Debug for EdgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeConfig")
            .field("listen", &self.listen)
            .field("root_domain", &self.root_domain)
            .field("download_base", &self.download_base)
            .field("bucket_name", &self.bucket_name)
            .field("key_id", &self.key_id)
            .field("app_key", &self.app_key.as_ref().map(|_| "..."))
            .field("auth_url", &self.auth_url)
            .field("auth_ttl_secs", &self.auth_ttl_secs)
            .field("auth_refresh_margin_secs", &self.auth_refresh_margin_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("routing_backend", &self.routing_backend)
            .field("cf_account_id", &self.cf_account_id)
            .field("cf_kv_namespace_id", &self.cf_kv_namespace_id)
            .field("cf_api_token", &self.cf_api_token.as_ref().map(|_| "..."))
            .field("routing_file", &self.routing_file)
            .field("server_name", &self.server_name)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EdgeConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `EDGE_LISTEN` | `0.0.0.0:8787` |
    /// | `ROOT_DOMAIN` | *(unset)* |
    /// | `B2_DOWNLOAD_BASE` | *(required)* |
    /// | `B2_BUCKET_NAME` | *(required)* |
    /// | `B2_KEY_ID` / `B2_APP_KEY` | *(unset)* |
    /// | `B2_AUTH_URL` | B2 `b2_authorize_account` |
    /// | `B2_AUTH_TTL_SECS` | `43200` |
    /// | `B2_AUTH_REFRESH_MARGIN_SECS` | `300` |
    /// | `UPSTREAM_CONNECT_TIMEOUT_SECS` | `5` |
    /// | `UPSTREAM_READ_TIMEOUT_SECS` | `30` |
    /// | `ROUTING_BACKEND` | `kv` |
    /// | `CF_ACCOUNT_ID` / `CF_KV_NAMESPACE_ID` / `CF_API_TOKEN` | *(unset)* |
    /// | `ROUTING_FILE` | *(unset)* |
    /// | `EDGE_SERVER_NAME` | `boop.cat` |
    /// | `LOG_LEVEL` | `info` |
    /// | `LOG_FORMAT` | `text` |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("EDGE_LISTEN") {
            config.listen = v;
        }
        config.root_domain = get("ROOT_DOMAIN");
        config.download_base = get("B2_DOWNLOAD_BASE");
        config.bucket_name = get("B2_BUCKET_NAME");
        config.key_id = get("B2_KEY_ID");
        config.app_key = get("B2_APP_KEY");
        if let Some(v) = get("B2_AUTH_URL") {
            config.auth_url = v;
        }
        parse_secs(get("B2_AUTH_TTL_SECS"), &mut config.auth_ttl_secs);
        parse_secs(
            get("B2_AUTH_REFRESH_MARGIN_SECS"),
            &mut config.auth_refresh_margin_secs,
        );
        parse_secs(
            get("UPSTREAM_CONNECT_TIMEOUT_SECS"),
            &mut config.connect_timeout_secs,
        );
        parse_secs(
            get("UPSTREAM_READ_TIMEOUT_SECS"),
            &mut config.read_timeout_secs,
        );
        if let Some(v) = get("ROUTING_BACKEND") {
            match RoutingBackend::parse(&v) {
                Some(backend) => config.routing_backend = backend,
                None => tracing::warn!(value = %v, "unknown ROUTING_BACKEND, using kv"),
            }
        }
        config.cf_account_id = get("CF_ACCOUNT_ID");
        config.cf_kv_namespace_id = get("CF_KV_NAMESPACE_ID");
        config.cf_api_token = get("CF_API_TOKEN");
        config.routing_file = get("ROUTING_FILE");
        if let Some(v) = get("EDGE_SERVER_NAME") {
            config.server_name = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = get("LOG_FORMAT") {
            config.log_format = v.to_ascii_lowercase();
        }

        config
    }

    /// Validate and extract the object store settings.
    pub fn storage(&self) -> EdgeResult<StorageConfig> {
        let download_base = self
            .download_base
            .as_deref()
            .ok_or_else(|| EdgeError::Configuration("B2_DOWNLOAD_BASE is not set".to_owned()))?;
        let bucket_name = self
            .bucket_name
            .clone()
            .ok_or_else(|| EdgeError::Configuration("B2_BUCKET_NAME is not set".to_owned()))?;

        let keys = match (&self.key_id, &self.app_key) {
            (Some(key_id), Some(app_key)) => Some(StaticKeys {
                key_id: key_id.clone(),
                app_key: app_key.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(EdgeError::Configuration(
                    "B2_KEY_ID and B2_APP_KEY must be set together".to_owned(),
                ));
            }
        };

        Ok(StorageConfig {
            download_base: download_base.trim_end_matches('/').to_owned(),
            bucket_name,
            keys,
            auth_url: self.auth_url.clone(),
            auth_ttl: Duration::from_secs(self.auth_ttl_secs),
            refresh_margin: Duration::from_secs(self.auth_refresh_margin_secs),
        })
    }

    /// Validate and extract the Cloudflare KV routing settings.
    pub fn kv_routing(&self) -> EdgeResult<KvRoutingConfig> {
        let missing = |name: &str| EdgeError::Configuration(format!("{name} is not set"));
        Ok(KvRoutingConfig {
            account_id: self
                .cf_account_id
                .clone()
                .ok_or_else(|| missing("CF_ACCOUNT_ID"))?,
            namespace_id: self
                .cf_kv_namespace_id
                .clone()
                .ok_or_else(|| missing("CF_KV_NAMESPACE_ID"))?,
            api_token: self
                .cf_api_token
                .clone()
                .ok_or_else(|| missing("CF_API_TOKEN"))?,
            api_base: String::from(crate::routing::kv::DEFAULT_API_BASE),
        })
    }

    /// Timeouts applied to every upstream HTTP call.
    #[must_use]
    pub fn upstream_timeouts(&self) -> UpstreamTimeouts {
        UpstreamTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            read: Duration::from_secs(self.read_timeout_secs),
        }
    }
}

fn parse_secs(raw: Option<String>, target: &mut u64) {
    if let Some(raw) = raw {
        match raw.trim().parse::<u64>() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(value = %raw, default = *target, "ignoring non-numeric duration"),
        }
    }
}

/// Long-lived key pair used to obtain short-lived download tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticKeys {
    /// Application key ID.
    pub key_id: String,
    /// Application key secret.
    pub app_key: String,
}

impl fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeys")
            .field("key_id", &self.key_id)
            .field("app_key", &"...")
            .finish()
    }
}

/// Validated object store settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Public download base URL, without a trailing slash.
    pub download_base: String,
    /// Bucket name.
    pub bucket_name: String,
    /// Static keys; `None` means unauthenticated public-read mode.
    pub keys: Option<StaticKeys>,
    /// Account authorization endpoint.
    pub auth_url: String,
    /// Local validity window of a fetched credential.
    pub auth_ttl: Duration,
    /// Refresh margin before expiry.
    pub refresh_margin: Duration,
}

/// Validated Cloudflare KV settings.
#[derive(Clone)]
pub struct KvRoutingConfig {
    /// Cloudflare account ID.
    pub account_id: String,
    /// KV namespace ID.
    pub namespace_id: String,
    /// API token with KV read permission.
    pub api_token: String,
    /// REST API base URL.
    pub api_base: String,
}

impl fmt::Debug for KvRoutingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvRoutingConfig")
            .field("account_id", &self.account_id)
            .field("namespace_id", &self.namespace_id)
            .field("api_token", &"...")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Upstream call timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamTimeouts {
    /// Connection establishment timeout.
    pub connect: Duration,
    /// Maximum idle time between reads.
    pub read: Duration,
}
