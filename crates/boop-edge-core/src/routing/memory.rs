//! In-memory routing store.
//!
//! Backs the `file` routing backend and the tests. The write methods exist
//! for seeding only; the gateway never calls them.

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{RoutingStore, current_key, host_key};
use crate::error::{EdgeError, EdgeResult};
use crate::types::{DeploymentId, SiteId};

/// Concurrent in-memory routing table.
#[derive(Debug, Default)]
pub struct MemoryRoutingStore {
    entries: DashMap<String, String>,
}

impl MemoryRoutingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from raw `(key, value)` routing entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Parse a JSON object of raw routing keys, e.g.
    /// `{"host:blog": "site1", "current:site1": "d1"}`.
    pub fn from_json(json: &str) -> EdgeResult<Self> {
        let map: std::collections::HashMap<String, String> = serde_json::from_str(json)
            .map_err(|e| EdgeError::Configuration(format!("invalid routing snapshot: {e}")))?;
        Ok(Self::from_entries(map))
    }

    /// Load a JSON routing snapshot from disk.
    pub fn from_file(path: impl AsRef<Path>) -> EdgeResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EdgeError::Configuration(format!(
                "cannot read routing snapshot {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw)
    }

    /// Bind a hostname or subdomain label to a site.
    pub fn bind_host(&self, host: &str, site: &SiteId) {
        self.entries.insert(host_key(host), site.to_string());
    }

    /// Point a site at a deployment.
    pub fn set_active_deployment(&self, site: &SiteId, deployment: &DeploymentId) {
        self.entries
            .insert(current_key(site), deployment.to_string());
    }

    /// Remove the active deployment of a site.
    pub fn clear_active_deployment(&self, site: &SiteId) {
        self.entries.remove(&current_key(site));
    }

    /// Number of raw entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RoutingStore for MemoryRoutingStore {
    async fn get(&self, key: &str) -> EdgeResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }
}
