//! Builds the gateway service from [`EdgeConfig`].

use std::sync::Arc;

use anyhow::{Context, Result};
use boop_edge_core::config::RoutingBackend;
use boop_edge_core::routing::{KvRoutingStore, MemoryRoutingStore};
use boop_edge_core::{CredentialCache, EdgeConfig, EdgeResult, RoutingStore, SiteResolver};
use boop_edge_http::{B2ObjectFetcher, EdgeHttpService, ResponseShaper, StorageOrigin};
use tracing::{error, info};

/// Build the routing store selected by `ROUTING_BACKEND`.
///
/// Routing is required to serve anything, so a bad routing setup fails
/// startup.
pub fn build_routing_store(config: &EdgeConfig) -> Result<Arc<dyn RoutingStore>> {
    match config.routing_backend {
        RoutingBackend::Kv => {
            let kv = config
                .kv_routing()
                .context("KV routing backend is not configured")?;
            info!(
                account_id = %kv.account_id,
                namespace_id = %kv.namespace_id,
                "using KV routing store"
            );
            let store = KvRoutingStore::new(kv, config.upstream_timeouts())?;
            Ok(Arc::new(store))
        }
        RoutingBackend::File => {
            let path = config
                .routing_file
                .as_deref()
                .context("ROUTING_FILE must be set for the file routing backend")?;
            let store = MemoryRoutingStore::from_file(path)?;
            info!(path, entries = store.len(), "loaded routing snapshot");
            Ok(Arc::new(store))
        }
    }
}

/// Build the object store origin.
///
/// Errors are kept rather than propagated: the server still starts and
/// answers 500 until the configuration is fixed.
pub fn build_origin(config: &EdgeConfig) -> EdgeResult<StorageOrigin> {
    let storage = config.storage()?;
    let timeouts = config.upstream_timeouts();
    let credentials = CredentialCache::from_storage(&storage, timeouts)?;
    info!(
        bucket = %storage.bucket_name,
        authenticated = credentials.is_authenticated(),
        "configured object store origin"
    );
    let fetcher = B2ObjectFetcher::new(storage.bucket_name, timeouts)?;
    Ok(StorageOrigin::new(Arc::new(credentials), Arc::new(fetcher)))
}

/// Assemble the gateway service.
pub fn build_service(config: &EdgeConfig) -> Result<EdgeHttpService> {
    let store = build_routing_store(config)?;
    let resolver = SiteResolver::new(store, config.root_domain.clone());
    let shaper = ResponseShaper::new(&config.server_name)?;

    let origin = build_origin(config);
    if let Err(err) = &origin {
        error!(error = %err, "object store is misconfigured, serving 500 until fixed");
    }

    Ok(EdgeHttpService::new(resolver, origin, shaper))
}
