//! The gateway service implementing hyper's `Service` trait.
//!
//! [`EdgeHttpService`] handles one request end to end:
//!
//! 1. Operational endpoints (`GET /_edge/health`, `GET /_edge/ready`)
//! 2. Storage configuration check (500 when unusable)
//! 3. Hostname extraction and site/deployment resolution
//! 4. Credential acquisition
//! 5. Fallback chain over the object store, first 200 wins
//! 6. Response shaping
//!
//! Dropping the returned future (client gone) drops any in-flight upstream
//! call with it.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use boop_edge_core::routing::normalize_host;
use boop_edge_core::{
    CredentialCache, DeploymentRoot, EdgeError, EdgeResult, ResolvedSite, SiteResolver,
    UpstreamAccess,
};
use http::header::{ACCEPT_ENCODING, HOST};
use http::request::Parts;
use http::{Method, Response, StatusCode};
use hyper::body::Incoming;
use hyper::service::Service;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::body::EdgeResponseBody;
use crate::fetcher::ObjectFetcher;
use crate::resolver::FallbackChain;
use crate::shaper::ResponseShaper;

/// Liveness endpoint.
pub const HEALTH_PATH: &str = "/_edge/health";
/// Readiness endpoint.
pub const READY_PATH: &str = "/_edge/ready";

const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Object store access: credentials plus the download client.
#[derive(Debug, Clone)]
pub struct StorageOrigin {
    credentials: Arc<CredentialCache>,
    fetcher: Arc<dyn ObjectFetcher>,
}

impl StorageOrigin {
    /// Combine a credential cache and a fetcher.
    #[must_use]
    pub fn new(credentials: Arc<CredentialCache>, fetcher: Arc<dyn ObjectFetcher>) -> Self {
        Self {
            credentials,
            fetcher,
        }
    }

    /// The shared credential cache.
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }
}

#[derive(Debug)]
struct Inner {
    resolver: SiteResolver,
    origin: EdgeResult<StorageOrigin>,
    shaper: ResponseShaper,
}

/// The edge gateway hyper service.
///
/// Cheap to clone; all clones share the resolver, origin and shaper.
#[derive(Debug, Clone)]
pub struct EdgeHttpService {
    inner: Arc<Inner>,
}

impl EdgeHttpService {
    /// Create the service.
    ///
    /// An `Err` origin puts the service in misconfigured mode: every gateway
    /// request is answered with a generic 500 and readiness reports 503.
    #[must_use]
    pub fn new(
        resolver: SiteResolver,
        origin: EdgeResult<StorageOrigin>,
        shaper: ResponseShaper,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                origin,
                shaper,
            }),
        }
    }

    /// Whether the object store configuration is usable.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.origin.is_ok()
    }

    /// Handle one request. Only the head is used; no body is read.
    pub async fn handle(&self, parts: &Parts) -> Response<EdgeResponseBody> {
        let request_id = Uuid::new_v4().to_string();
        let path = parts.uri.path();
        debug!(method = %parts.method, path, request_id, "processing edge request");

        if let Some(response) = self.operational_response(&parts.method, path) {
            return response;
        }

        let shaper = &self.inner.shaper;
        let origin = match &self.inner.origin {
            Ok(origin) => origin,
            Err(err) => {
                error!(error = %err, request_id, "storage is misconfigured");
                return shaper.error(err);
            }
        };

        match self.serve_site(origin, parts, &request_id).await {
            Ok(response) => response,
            Err(err) => {
                log_failure(&err, &request_id);
                shaper.error(&err)
            }
        }
    }

    async fn serve_site(
        &self,
        origin: &StorageOrigin,
        parts: &Parts,
        request_id: &str,
    ) -> EdgeResult<Response<EdgeResponseBody>> {
        let site = resolve_request(&self.inner.resolver, parts).await?;
        let access = origin.credentials.acquire().await?;

        let path = parts.uri.path();
        let root = DeploymentRoot::new(&site.site_id, &site.deployment_id);
        let chain = FallbackChain::plan(&root, path);
        if chain.is_empty() {
            info!(host = %site.host, path, request_id, "rejected path outside deployment");
            return Ok(self.inner.shaper.not_found());
        }
        let accept_encoding = parts.headers.get(ACCEPT_ENCODING);

        for candidate in &chain {
            let upstream = origin
                .fetcher
                .fetch(&candidate.key, accept_encoding, &access)
                .await?;
            let status = upstream.status;
            debug!(
                step = %candidate.step,
                key = %candidate.key,
                status = status.as_u16(),
                request_id,
                "fetched candidate"
            );

            match status {
                StatusCode::OK => {
                    info!(
                        host = %site.host,
                        site_id = %site.site_id,
                        deploy_id = %site.deployment_id,
                        step = %candidate.step,
                        request_id,
                        "served object"
                    );
                    return Ok(self.inner.shaper.shape_hit(upstream, path, &site));
                }
                StatusCode::NOT_FOUND => {}
                StatusCode::UNAUTHORIZED => {
                    invalidate(origin, &access);
                    return Err(EdgeError::UpstreamAuth(
                        "object store rejected credential".to_owned(),
                    ));
                }
                status => {
                    warn!(
                        step = %candidate.step,
                        status = status.as_u16(),
                        request_id,
                        "unexpected object store status, treating as miss"
                    );
                }
            }
        }

        info!(
            host = %site.host,
            site_id = %site.site_id,
            deploy_id = %site.deployment_id,
            attempts = chain.len(),
            request_id,
            "fallback chain exhausted"
        );
        Ok(self.inner.shaper.not_found())
    }

    fn operational_response(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<Response<EdgeResponseBody>> {
        if *method != Method::GET {
            return None;
        }
        let shaper = &self.inner.shaper;
        match path {
            HEALTH_PATH => Some(shaper.json(
                StatusCode::OK,
                serde_json::json!({ "status": "ok", "service": "boop-edge" }).to_string(),
            )),
            READY_PATH if self.is_ready() => Some(shaper.json(
                StatusCode::OK,
                serde_json::json!({ "status": "ready" }).to_string(),
            )),
            READY_PATH => Some(shaper.json(
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "status": "misconfigured" }).to_string(),
            )),
            _ => None,
        }
    }
}

impl Service<http::Request<Incoming>> for EdgeHttpService {
    type Response = Response<EdgeResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            drop(body);
            Ok(service.handle(&parts).await)
        })
    }
}

/// Normalized hostname of a request: `x-forwarded-host`, else the URI
/// authority, else `host`.
#[must_use]
pub fn request_host(parts: &Parts) -> Option<String> {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(normalize_host)
    };

    header(X_FORWARDED_HOST)
        .or_else(|| parts.uri.authority().and_then(|a| normalize_host(a.as_str())))
        .or_else(|| header(HOST.as_str()))
}

fn invalidate(origin: &StorageOrigin, access: &UpstreamAccess) {
    if let Some(credential) = access.credential() {
        origin.credentials.invalidate(credential);
    }
}

fn log_failure(err: &EdgeError, request_id: &str) {
    match err {
        EdgeError::SiteNotFound(host) => info!(host, request_id, "no site for host"),
        EdgeError::NoDeployment(site_id) => info!(site_id, request_id, "site has no active deployment"),
        EdgeError::Configuration(_) | EdgeError::UpstreamUnavailable(_) => {
            error!(error = %err, request_id, "edge request failed");
        }
        EdgeError::UpstreamAuth(_)
        | EdgeError::UpstreamTimeout
        | EdgeError::RoutingUnavailable(_) => {
            warn!(error = %err, request_id, "edge request failed");
        }
    }
}

/// Resolve the site for a request without touching the object store.
pub async fn resolve_request(resolver: &SiteResolver, parts: &Parts) -> EdgeResult<ResolvedSite> {
    let host = request_host(parts).ok_or_else(|| EdgeError::SiteNotFound(String::new()))?;
    resolver.resolve(&host).await
}
