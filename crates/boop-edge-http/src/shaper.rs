//! Outbound response shaping.
//!
//! A hit keeps the upstream headers minus storage-internal and hop-by-hop
//! ones, gains the cache policy and the `x-boop-*` diagnostics, and streams
//! the upstream body as-is. Errors are short plain-text bodies that never
//! carry keys, bucket names or credentials.

use boop_edge_core::{EdgeError, EdgeResult, ResolvedSite};
use http::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderName, SERVER, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use tracing::warn;

use crate::body::EdgeResponseBody;
use crate::fetcher::UpstreamResponse;
use crate::policy::CachePolicy;

/// Diagnostic header naming the serving host.
pub const X_BOOP_HOST: HeaderName = HeaderName::from_static("x-boop-host");
/// Diagnostic header carrying the resolved site ID.
pub const X_BOOP_SITE_ID: HeaderName = HeaderName::from_static("x-boop-site-id");
/// Diagnostic header carrying the resolved deployment ID.
pub const X_BOOP_DEPLOY_ID: HeaderName = HeaderName::from_static("x-boop-deploy-id");

/// Prefix of object-store-internal headers (file id, sha1, upload time, info-*).
const STORAGE_HEADER_PREFIX: &str = "x-bz-";

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
];

/// Body returned when every candidate key missed.
pub const NOT_FOUND_BODY: &str = "Not found";

/// Builds client responses.
#[derive(Debug, Clone)]
pub struct ResponseShaper {
    server: HeaderValue,
}

impl ResponseShaper {
    /// Create a shaper that stamps `server_name` on every response.
    pub fn new(server_name: &str) -> EdgeResult<Self> {
        let server = HeaderValue::from_str(server_name).map_err(|_| {
            EdgeError::Configuration(format!("invalid server name {server_name:?}"))
        })?;
        Ok(Self { server })
    }

    /// Shape a 200 from the object store into the client response.
    #[must_use]
    pub fn shape_hit(
        &self,
        upstream: UpstreamResponse,
        path: &str,
        site: &ResolvedSite,
    ) -> Response<EdgeResponseBody> {
        let mut headers = upstream.headers;
        strip_upstream_headers(&mut headers);

        headers.insert(CACHE_CONTROL, CachePolicy::for_path(path).header_value());
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(SERVER, self.server.clone());
        headers.insert(X_BOOP_HOST, self.server.clone());
        insert_id(&mut headers, X_BOOP_SITE_ID, site.site_id.as_str());
        insert_id(&mut headers, X_BOOP_DEPLOY_ID, site.deployment_id.as_str());

        let mut response = Response::new(upstream.body);
        *response.status_mut() = StatusCode::OK;
        *response.headers_mut() = headers;
        response
    }

    /// Response for a terminal error.
    #[must_use]
    pub fn error(&self, err: &EdgeError) -> Response<EdgeResponseBody> {
        self.plain_text(err.status_code(), err.public_message())
    }

    /// Response for an exhausted fallback chain.
    #[must_use]
    pub fn not_found(&self) -> Response<EdgeResponseBody> {
        self.plain_text(StatusCode::NOT_FOUND, NOT_FOUND_BODY)
    }

    /// Small JSON response used by the operational endpoints.
    #[must_use]
    pub fn json(&self, status: StatusCode, body: String) -> Response<EdgeResponseBody> {
        let mut response = Response::new(EdgeResponseBody::from_string(body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.add_common_headers(headers);
        response
    }

    fn plain_text(&self, status: StatusCode, body: &'static str) -> Response<EdgeResponseBody> {
        let mut response = Response::new(EdgeResponseBody::from_string(body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.add_common_headers(headers);
        response
    }

    fn add_common_headers(&self, headers: &mut HeaderMap) {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(SERVER, self.server.clone());
    }
}

/// Remove headers that must never reach the client.
pub fn strip_upstream_headers(headers: &mut HeaderMap) {
    let internal: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with(STORAGE_HEADER_PREFIX))
        .cloned()
        .collect();
    for name in internal {
        headers.remove(&name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    headers.remove(CACHE_CONTROL);
    headers.remove(SERVER);
}

fn insert_id(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!(header = %name, "routing id is not a valid header value"),
    }
}
