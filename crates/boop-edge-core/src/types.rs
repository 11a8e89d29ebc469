//! Identifier types shared by routing, fetching and response shaping.

use std::fmt;

/// Tenant site identifier, as stored in `host:*` routing entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SiteId(String);

impl SiteId {
    /// Create a new site ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the site ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one immutable build output of a site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Create a new deployment ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the deployment ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object-key prefix of a deployment: `sites/{site}/{deployment}`.
///
/// Every file of a deployment lives under this prefix, so switching the
/// active deployment of a site moves all reads to a disjoint namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRoot {
    prefix: String,
}

impl DeploymentRoot {
    /// Build the prefix for a site and deployment.
    #[must_use]
    pub fn new(site: &SiteId, deployment: &DeploymentId) -> Self {
        Self {
            prefix: format!("sites/{site}/{deployment}"),
        }
    }

    /// The prefix without a trailing slash.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    /// Full object key for a path relative to the deployment root.
    #[must_use]
    pub fn object_key(&self, relative: &str) -> String {
        format!("{}/{}", self.prefix, relative.trim_start_matches('/'))
    }
}

impl fmt::Display for DeploymentRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}
