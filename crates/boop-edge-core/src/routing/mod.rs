//! Hostname to site to active-deployment resolution.
//!
//! The routing store is owned by the deploy pipeline; the edge only reads
//! it. Two key families are used:
//!
//! | Key | Value |
//! |-----|-------|
//! | `host:{hostname or subdomain label}` | site ID |
//! | `current:{site ID}` | active deployment ID |
//!
//! Resolution is two point reads with no caching at this layer: staleness
//! tolerance belongs to the store.

pub mod kv;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{EdgeError, EdgeResult};
use crate::types::{DeploymentId, SiteId};

pub use kv::KvRoutingStore;
pub use memory::MemoryRoutingStore;

/// Routing key for a host binding.
#[must_use]
pub fn host_key(host: &str) -> String {
    format!("host:{host}")
}

/// Routing key for the active deployment of a site.
#[must_use]
pub fn current_key(site: &SiteId) -> String {
    format!("current:{site}")
}

/// Read-only view of the routing table.
///
/// Backends implement [`get`](RoutingStore::get); the typed lookups are
/// derived from it. Empty stored values count as absent.
#[async_trait]
pub trait RoutingStore: Send + Sync + fmt::Debug {
    /// Point read of a raw routing key.
    async fn get(&self, key: &str) -> EdgeResult<Option<String>>;

    /// Site bound to a hostname or bare subdomain label.
    async fn site_for_host(&self, host: &str) -> EdgeResult<Option<SiteId>> {
        Ok(self
            .get(&host_key(host))
            .await?
            .filter(|v| !v.is_empty())
            .map(SiteId::new))
    }

    /// Active deployment of a site.
    async fn active_deployment(&self, site: &SiteId) -> EdgeResult<Option<DeploymentId>> {
        Ok(self
            .get(&current_key(site))
            .await?
            .filter(|v| !v.is_empty())
            .map(DeploymentId::new))
    }
}

/// Normalize a raw host header value.
///
/// Takes the first entry of a comma-separated list, lower-cases it, strips
/// the port and a trailing dot. IPv6 literals keep their brackets.
#[must_use]
pub fn normalize_host(raw: &str) -> Option<String> {
    let first = raw.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }

    let host = if first.starts_with('[') {
        match first.find(']') {
            Some(end) => &first[..=end],
            None => first,
        }
    } else {
        match first.rsplit_once(':') {
            Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
            _ => first,
        }
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    (!host.is_empty()).then_some(host)
}

/// Derive the single subdomain label of `host` under `root`.
///
/// Returns `None` when the host is the root itself, lies outside the root,
/// or has more than one label in front of it (`a.b.root`).
#[must_use]
pub fn parse_subdomain<'a>(host: &'a str, root: &str) -> Option<&'a str> {
    let root = root.trim_matches('.');
    if root.is_empty() || host.len() <= root.len() + 1 {
        return None;
    }

    let split = host.len() - root.len();
    if !host.is_char_boundary(split) {
        return None;
    }
    let (label, suffix) = host.split_at(split);
    if !suffix.eq_ignore_ascii_case(root) {
        return None;
    }

    let label = label.strip_suffix('.')?;
    if label.is_empty() || label.contains('.') {
        return None;
    }
    Some(label)
}

/// Site and deployment a request is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSite {
    /// Normalized request hostname.
    pub host: String,
    /// Tenant site.
    pub site_id: SiteId,
    /// Active deployment at resolution time.
    pub deployment_id: DeploymentId,
}

/// Resolves request hostnames through a [`RoutingStore`].
#[derive(Debug, Clone)]
pub struct SiteResolver {
    store: Arc<dyn RoutingStore>,
    root_domain: Option<String>,
}

impl SiteResolver {
    /// Create a resolver; `root_domain` enables subdomain matching.
    #[must_use]
    pub fn new(store: Arc<dyn RoutingStore>, root_domain: Option<String>) -> Self {
        Self {
            store,
            root_domain: root_domain.map(|d| d.trim_matches('.').to_ascii_lowercase()),
        }
    }

    /// Look up the site for a normalized hostname.
    ///
    /// The literal hostname wins (custom domains); the subdomain label under
    /// the root domain is tried second.
    pub async fn resolve_site(&self, host: &str) -> EdgeResult<SiteId> {
        if let Some(site) = self.store.site_for_host(host).await? {
            debug!(host, site_id = %site, "matched host binding");
            return Ok(site);
        }

        if let Some(label) = self
            .root_domain
            .as_deref()
            .and_then(|root| parse_subdomain(host, root))
        {
            if let Some(site) = self.store.site_for_host(label).await? {
                debug!(host, label, site_id = %site, "matched subdomain binding");
                return Ok(site);
            }
        }

        Err(EdgeError::SiteNotFound(host.to_owned()))
    }

    /// Look up the active deployment of a site.
    pub async fn resolve_deployment(&self, site: &SiteId) -> EdgeResult<DeploymentId> {
        self.store
            .active_deployment(site)
            .await?
            .ok_or_else(|| EdgeError::NoDeployment(site.to_string()))
    }

    /// Resolve a normalized hostname to its site and active deployment.
    pub async fn resolve(&self, host: &str) -> EdgeResult<ResolvedSite> {
        let site_id = self.resolve_site(host).await?;
        let deployment_id = self.resolve_deployment(&site_id).await?;
        Ok(ResolvedSite {
            host: host.to_owned(),
            site_id,
            deployment_id,
        })
    }
}
