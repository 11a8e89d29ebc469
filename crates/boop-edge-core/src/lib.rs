//! Core types for the boop edge origin resolver.
//!
//! - **Configuration** ([`config`]): environment-driven settings, validated
//!   per component.
//! - **Routing** ([`routing`]): hostname to site to active deployment, over a
//!   pluggable [`RoutingStore`](routing::RoutingStore).
//! - **Credentials** ([`credential`]): object store authorization behind a
//!   lock-free [`CredentialCache`](credential::CredentialCache).
//! - **Errors**: the [`EdgeError`] taxonomy and its client-visible mapping.

pub mod config;
pub mod credential;
mod error;
pub mod routing;
mod types;

pub use config::{EdgeConfig, RoutingBackend, StorageConfig, UpstreamTimeouts};
pub use credential::{Authorizer, CredentialCache, UpstreamAccess};
pub use error::{EdgeError, EdgeResult};
pub use routing::{ResolvedSite, RoutingStore, SiteResolver};
pub use types::{DeploymentId, DeploymentRoot, SiteId};
