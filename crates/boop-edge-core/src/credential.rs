//! Object store authorization with a process-wide credential cache.
//!
//! A credential is an immutable snapshot (token, download URL, expiry) held
//! in an [`ArcSwapOption`]. Readers load the current snapshot without
//! locking; a refresh builds a new snapshot and swaps it in. Concurrent
//! refreshes may race and the last store wins, which is fine because tokens
//! are interchangeable.
//!
//! ```text
//! acquire()
//!   -> cached and not within refresh margin of expiry?  -> use it
//!   -> authorize() ok                                   -> store + use new
//!   -> authorize() failed, cached still unexpired       -> use cached (warn)
//!   -> authorize() failed otherwise                     -> UpstreamAuth
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{StaticKeys, StorageConfig, UpstreamTimeouts};
use crate::error::{EdgeError, EdgeResult};

/// Result of one successful account authorization.
#[derive(Clone, PartialEq, Eq)]
pub struct Authorization {
    /// Bearer token for downloads.
    pub token: String,
    /// Download base URL for this account, without a trailing slash.
    pub download_url: String,
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("token", &"...")
            .field("download_url", &self.download_url)
            .finish()
    }
}

/// Exchanges long-lived static keys for a short-lived download token.
#[async_trait]
pub trait Authorizer: Send + Sync + fmt::Debug {
    /// Perform one authorization call.
    async fn authorize(&self) -> EdgeResult<Authorization>;
}

/// Response of `b2_authorize_account` (fields the edge needs).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeAccountResponse {
    authorization_token: String,
    download_url: String,
    #[serde(default)]
    account_id: Option<String>,
}

/// Backblaze B2 account authorization over HTTP Basic auth.
#[derive(Debug, Clone)]
pub struct B2Authorizer {
    client: Client,
    auth_url: String,
    keys: StaticKeys,
}

impl B2Authorizer {
    /// Create an authorizer with its own HTTP client.
    pub fn new(auth_url: impl Into<String>, keys: StaticKeys, timeouts: UpstreamTimeouts) -> EdgeResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .build()
            .map_err(|e| EdgeError::Configuration(format!("cannot build auth client: {e}")))?;
        Ok(Self::with_client(client, auth_url, keys))
    }

    /// Create an authorizer around an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, auth_url: impl Into<String>, keys: StaticKeys) -> Self {
        Self {
            client,
            auth_url: auth_url.into(),
            keys,
        }
    }
}

#[async_trait]
impl Authorizer for B2Authorizer {
    async fn authorize(&self) -> EdgeResult<Authorization> {
        let response = self
            .client
            .get(&self.auth_url)
            .basic_auth(&self.keys.key_id, Some(&self.keys.app_key))
            .send()
            .await
            .map_err(|e| EdgeError::UpstreamAuth(format!("authorize request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EdgeError::UpstreamAuth(format!(
                "authorize returned {status}"
            )));
        }

        let body: AuthorizeAccountResponse = response
            .json()
            .await
            .map_err(|e| EdgeError::UpstreamAuth(format!("invalid authorize response: {e}")))?;
        debug!(account_id = ?body.account_id, "authorized object store account");

        Ok(Authorization {
            token: body.authorization_token,
            download_url: body.download_url.trim_end_matches('/').to_owned(),
        })
    }
}

/// A cached download credential. Never used past `expires_at`.
pub struct UpstreamCredential {
    token: String,
    download_url: String,
    expires_at: Instant,
}

impl UpstreamCredential {
    /// Build a credential from an authorization, valid for `ttl` from `now`.
    #[must_use]
    pub fn new(auth: Authorization, now: Instant, ttl: Duration) -> Self {
        Self {
            token: auth.token,
            download_url: auth.download_url,
            expires_at: now + ttl,
        }
    }

    /// Bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Download base URL.
    #[must_use]
    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    /// Absolute expiry instant.
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether the credential may still be used at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Whether `now` falls within `margin` of expiry (or past it).
    #[must_use]
    pub fn needs_refresh_at(&self, now: Instant, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

impl fmt::Debug for UpstreamCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamCredential")
            .field("token", &"...")
            .field("download_url", &self.download_url)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// How one request reaches the object store.
#[derive(Debug, Clone)]
pub struct UpstreamAccess {
    base_url: Arc<str>,
    credential: Option<Arc<UpstreamCredential>>,
}

impl UpstreamAccess {
    /// Unauthenticated access against a public base URL.
    #[must_use]
    pub fn public(base_url: Arc<str>) -> Self {
        Self {
            base_url,
            credential: None,
        }
    }

    /// Authenticated access through a cached credential.
    #[must_use]
    pub fn authorized(credential: Arc<UpstreamCredential>) -> Self {
        Self {
            base_url: Arc::from(credential.download_url()),
            credential: Some(credential),
        }
    }

    /// Download base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Value of the `authorization` header, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.credential.as_deref().map(UpstreamCredential::token)
    }

    /// The credential backing this access, if any.
    #[must_use]
    pub fn credential(&self) -> Option<&Arc<UpstreamCredential>> {
        self.credential.as_ref()
    }
}

/// Process-wide cache of the object store credential.
pub struct CredentialCache {
    authorizer: Option<Arc<dyn Authorizer>>,
    public_base: Arc<str>,
    current: ArcSwapOption<UpstreamCredential>,
    ttl: Duration,
    margin: Duration,
    refreshes: AtomicU64,
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("authenticated", &self.authorizer.is_some())
            .field("public_base", &self.public_base)
            .field("ttl", &self.ttl)
            .field("margin", &self.margin)
            .field("refreshes", &self.refresh_count())
            .finish_non_exhaustive()
    }
}

impl CredentialCache {
    /// Cache that authorizes through `authorizer`.
    ///
    /// The refresh margin is capped at half the TTL so a fresh credential is
    /// always usable for a while.
    #[must_use]
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        public_base: impl Into<Arc<str>>,
        ttl: Duration,
        margin: Duration,
    ) -> Self {
        Self {
            authorizer: Some(authorizer),
            public_base: public_base.into(),
            current: ArcSwapOption::empty(),
            ttl,
            margin: margin.min(ttl / 2),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Degraded mode: no keys configured, every request goes to the public base.
    #[must_use]
    pub fn unauthenticated(public_base: impl Into<Arc<str>>) -> Self {
        Self {
            authorizer: None,
            public_base: public_base.into(),
            current: ArcSwapOption::empty(),
            ttl: Duration::ZERO,
            margin: Duration::ZERO,
            refreshes: AtomicU64::new(0),
        }
    }

    /// Build the cache for validated storage settings.
    pub fn from_storage(storage: &StorageConfig, timeouts: UpstreamTimeouts) -> EdgeResult<Self> {
        match &storage.keys {
            Some(keys) => {
                let authorizer = B2Authorizer::new(storage.auth_url.clone(), keys.clone(), timeouts)?;
                Ok(Self::new(
                    Arc::new(authorizer),
                    storage.download_base.as_str(),
                    storage.auth_ttl,
                    storage.refresh_margin,
                ))
            }
            None => Ok(Self::unauthenticated(storage.download_base.as_str())),
        }
    }

    /// Whether static keys are configured.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authorizer.is_some()
    }

    /// Number of successful refreshes performed so far.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Return usable access, refreshing the credential if needed.
    pub async fn acquire(&self) -> EdgeResult<UpstreamAccess> {
        let Some(authorizer) = &self.authorizer else {
            return Ok(UpstreamAccess::public(Arc::clone(&self.public_base)));
        };

        let cached = self.current.load_full();
        if let Some(credential) = &cached {
            if !credential.needs_refresh_at(Instant::now(), self.margin) {
                return Ok(UpstreamAccess::authorized(Arc::clone(credential)));
            }
        }

        match authorizer.authorize().await {
            Ok(auth) => {
                let credential = Arc::new(UpstreamCredential::new(auth, Instant::now(), self.ttl));
                self.current.store(Some(Arc::clone(&credential)));
                let total = self.refreshes.fetch_add(1, Ordering::Relaxed) + 1;
                info!(refreshes = total, ttl_secs = self.ttl.as_secs(), "refreshed object store credential");
                Ok(UpstreamAccess::authorized(credential))
            }
            Err(err) => match cached.filter(|c| c.is_valid_at(Instant::now())) {
                Some(credential) => {
                    warn!(error = %err, "credential refresh failed, using cached credential");
                    Ok(UpstreamAccess::authorized(credential))
                }
                None => Err(err),
            },
        }
    }

    /// Drop `stale` so the next [`acquire`](Self::acquire) refreshes.
    ///
    /// Only removes the cached value if it is still `stale`; a newer
    /// credential stored by a concurrent refresh is kept.
    pub fn invalidate(&self, stale: &Arc<UpstreamCredential>) {
        self.current.rcu(|current| match current {
            Some(c) if Arc::ptr_eq(c, stale) => None,
            other => other.clone(),
        });
        debug!("invalidated object store credential");
    }
}
