//! Error taxonomy for the edge origin resolver.
//!
//! Fallback-chain misses are not errors: they are handled inside the gateway
//! and never reach this type. Everything here is a terminal condition for one
//! request and maps to exactly one client-visible status and body.

use http::StatusCode;

/// Terminal failure while resolving or serving a request.
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    /// Required storage configuration is absent or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The hostname has no routing entry, directly or via its subdomain label.
    #[error("no site bound to host {0}")]
    SiteNotFound(String),

    /// The site exists but has no active deployment.
    #[error("site {0} has no active deployment")]
    NoDeployment(String),

    /// Refreshing the object store authorization failed and no usable
    /// credential is cached.
    #[error("object store authorization failed: {0}")]
    UpstreamAuth(String),

    /// Transport-level failure talking to the object store.
    #[error("object store unavailable: {0}")]
    UpstreamUnavailable(String),

    /// An upstream call exceeded its timeout.
    #[error("object store request timed out")]
    UpstreamTimeout,

    /// The routing store could not be read.
    #[error("routing store unavailable: {0}")]
    RoutingUnavailable(String),
}

impl EdgeError {
    /// HTTP status sent to the client for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SiteNotFound(_) | Self::NoDeployment(_) => StatusCode::NOT_FOUND,
            Self::UpstreamAuth(_) | Self::RoutingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Client-safe response body.
    ///
    /// `SiteNotFound` and `NoDeployment` share a body so probing cannot tell
    /// an unknown host from an undeployed site.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Service misconfigured",
            Self::SiteNotFound(_) | Self::NoDeployment(_) => "Site not found",
            Self::UpstreamAuth(_) | Self::RoutingUnavailable(_) => "Service unavailable",
            Self::UpstreamUnavailable(_) => "Bad gateway",
            Self::UpstreamTimeout => "Gateway timeout",
        }
    }
}

/// Convenience result type for edge operations.
pub type EdgeResult<T> = Result<T, EdgeError>;
