//! HTTP layer of the boop edge origin resolver.
//!
//! - **Policy** ([`policy`]): asset classification and cache-control tiers.
//! - **Resolver** ([`resolver`]): the ordered fallback chain of object keys.
//! - **Fetcher** ([`fetcher`]): one GET per key against the object store,
//!   behind the [`ObjectFetcher`](fetcher::ObjectFetcher) trait.
//! - **Shaper** ([`shaper`]): outbound headers, cache policy and error bodies.
//! - **Service** ([`service`]): [`EdgeHttpService`](service::EdgeHttpService),
//!   the hyper `Service` tying it together.
//! - **Body** ([`body`]): [`EdgeResponseBody`](body::EdgeResponseBody), streaming
//!   or buffered.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> EdgeHttpService (hyper Service)
//!     -> /_edge/health, /_edge/ready interception
//!     -> host -> site -> active deployment (SiteResolver)
//!     -> CredentialCache::acquire
//!     -> FallbackChain: fetch each candidate until a 200
//!     -> ResponseShaper (cache policy, x-boop-*, header stripping)
//!   <- HTTP Response (body streamed from upstream)
//! ```

pub mod body;
pub mod fetcher;
pub mod policy;
pub mod resolver;
pub mod service;
pub mod shaper;

pub use body::EdgeResponseBody;
pub use fetcher::{B2ObjectFetcher, ObjectFetcher, UpstreamResponse};
pub use resolver::{Candidate, FallbackChain, FallbackStep};
pub use service::{EdgeHttpService, StorageOrigin};
pub use shaper::ResponseShaper;
