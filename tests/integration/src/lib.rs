//! End-to-end tests for the boop edge server.
//!
//! Each test starts a fake B2 object store and the real gateway service on
//! loopback sockets, then drives the gateway with `reqwest`. Nothing external
//! is needed:
//!
//! ```text
//! cargo test -p boop-edge-integration
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use boop_edge_core::config::RoutingBackend;
use boop_edge_core::routing::MemoryRoutingStore;
use boop_edge_core::{CredentialCache, EdgeConfig, SiteResolver};
use boop_edge_http::{B2ObjectFetcher, EdgeHttpService, ResponseShaper, StorageOrigin};
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

mod test_auth;
mod test_headers;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Bucket served by the fake store.
pub const BUCKET: &str = "boop-sites";

/// One stored object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    body: Bytes,
    content_type: &'static str,
    content_encoding: Option<&'static str>,
}

impl StoredObject {
    /// Plain object.
    #[must_use]
    pub fn new(body: impl Into<Bytes>, content_type: &'static str) -> Self {
        Self {
            body: body.into(),
            content_type,
            content_encoding: None,
        }
    }

    /// Object stored pre-compressed.
    #[must_use]
    pub fn encoded(mut self, encoding: &'static str) -> Self {
        self.content_encoding = Some(encoding);
        self
    }
}

#[derive(Debug, Default)]
struct StoreState {
    objects: Mutex<HashMap<String, StoredObject>>,
    require_auth: bool,
    authorizations: AtomicUsize,
    valid_token: Mutex<Option<String>>,
    downloads: Mutex<Vec<String>>,
    accept_encodings: Mutex<Vec<Option<String>>>,
}

/// In-process stand-in for the B2 authorize and download endpoints.
#[derive(Debug)]
pub struct FakeObjectStore {
    addr: SocketAddr,
    state: Arc<StoreState>,
    task: JoinHandle<()>,
}

impl FakeObjectStore {
    /// Start a public-read store.
    pub async fn start() -> Self {
        Self::start_with(false).await
    }

    /// Start a store that requires a token from the authorize endpoint.
    pub async fn start_private() -> Self {
        Self::start_with(true).await
    }

    async fn start_with(require_auth: bool) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake store");
        let addr = listener.local_addr().expect("fake store addr");
        let state = Arc::new(StoreState {
            require_auth,
            ..StoreState::default()
        });

        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                let state = Arc::clone(&task_state);
                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<Incoming>| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(handle_store_request(&state, addr, &req)) }
                    });
                    let _ = HttpConnBuilder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });

        Self { addr, state, task }
    }

    /// Public download base URL.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Authorize endpoint URL.
    #[must_use]
    pub fn auth_url(&self) -> String {
        format!("http://{}/b2api/v2/b2_authorize_account", self.addr)
    }

    /// Store an object under its full key.
    pub fn put(&self, key: &str, object: StoredObject) {
        self.state
            .objects
            .lock()
            .expect("objects lock")
            .insert(key.to_owned(), object);
    }

    /// Store an HTML document.
    pub fn put_html(&self, key: &str, html: &'static str) {
        self.put(key, StoredObject::new(html, "text/html"));
    }

    /// Keys requested so far, in order.
    #[must_use]
    pub fn downloads(&self) -> Vec<String> {
        self.state.downloads.lock().expect("downloads lock").clone()
    }

    /// `accept-encoding` seen on each download.
    #[must_use]
    pub fn accept_encodings(&self) -> Vec<Option<String>> {
        self.state
            .accept_encodings
            .lock()
            .expect("accept-encodings lock")
            .clone()
    }

    /// Number of authorize calls served.
    #[must_use]
    pub fn authorizations(&self) -> usize {
        self.state.authorizations.load(Ordering::SeqCst)
    }

    /// Forget every issued token; downloads answer 401 until re-authorized.
    pub fn revoke_tokens(&self) {
        *self.state.valid_token.lock().expect("token lock") = None;
    }
}

impl Drop for FakeObjectStore {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn handle_store_request(
    state: &StoreState,
    addr: SocketAddr,
    req: &Request<Incoming>,
) -> Response<Full<Bytes>> {
    let path = req.uri().path();

    if path == "/b2api/v2/b2_authorize_account" {
        let basic = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("Basic "));
        if !basic {
            return store_response(StatusCode::UNAUTHORIZED, r#"{"code":"unauthorized"}"#);
        }
        let n = state.authorizations.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("token-{n}");
        *state.valid_token.lock().expect("token lock") = Some(token.clone());
        let body = serde_json::json!({
            "accountId": "acct",
            "authorizationToken": token,
            "apiUrl": format!("http://{addr}"),
            "downloadUrl": format!("http://{addr}/"),
        });
        return store_response(StatusCode::OK, body.to_string());
    }

    let prefix = format!("/file/{BUCKET}/");
    let Some(key) = path.strip_prefix(&prefix) else {
        return store_response(StatusCode::BAD_REQUEST, r#"{"code":"bad_request"}"#);
    };
    state.downloads.lock().expect("downloads lock").push(key.to_owned());
    state.accept_encodings.lock().expect("accept-encodings lock").push(
        req.headers()
            .get("accept-encoding")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    );

    if state.require_auth {
        let presented = req.headers().get("authorization").and_then(|v| v.to_str().ok());
        let valid = state.valid_token.lock().expect("token lock").clone();
        if valid.is_none() || presented != valid.as_deref() {
            return store_response(StatusCode::UNAUTHORIZED, r#"{"code":"expired_auth_token"}"#);
        }
    }

    let object = state.objects.lock().expect("objects lock").get(key).cloned();
    match object {
        Some(object) => {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header("content-type", object.content_type)
                .header("content-length", object.body.len())
                .header("cache-control", "max-age=0")
                .header("server", "fake-b2")
                .header("x-bz-file-name", key)
                .header("x-bz-file-id", "4_zfake_f1")
                .header("x-bz-content-sha1", "da39a3ee5e6b4b0d3255bfef95601890afd80709")
                .header("x-bz-upload-timestamp", "1700000000000")
                .header("x-bz-info-src_last_modified_millis", "1700000000000");
            if let Some(encoding) = object.content_encoding {
                builder = builder.header("content-encoding", encoding);
            }
            builder.body(Full::new(object.body)).expect("valid store response")
        }
        None => store_response(StatusCode::NOT_FOUND, r#"{"status":404,"code":"not_found"}"#),
    }
}

fn store_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(body.into()))
        .expect("valid store response")
}

/// Running gateway on a loopback port.
#[derive(Debug)]
pub struct EdgeServer {
    addr: SocketAddr,
    client: reqwest::Client,
    routing: Arc<MemoryRoutingStore>,
    task: JoinHandle<()>,
}

impl EdgeServer {
    /// Start the gateway in front of `store`, authenticated if the store is private.
    pub async fn start(store: &FakeObjectStore) -> Self {
        let config = EdgeConfig::builder()
            .root_domain(Some("boop.cat".to_owned()))
            .download_base(Some(store.base_url()))
            .bucket_name(Some(BUCKET.to_owned()))
            .auth_url(store.auth_url())
            .routing_backend(RoutingBackend::File)
            .build();
        let config = if store.state.require_auth {
            EdgeConfig {
                key_id: Some("key-id".to_owned()),
                app_key: Some("app-key".to_owned()),
                ..config
            }
        } else {
            config
        };
        Self::start_with_config(&config).await
    }

    /// Start the gateway from an explicit configuration.
    pub async fn start_with_config(config: &EdgeConfig) -> Self {
        init_tracing();
        let routing = Arc::new(MemoryRoutingStore::new());
        let resolver = SiteResolver::new(routing.clone(), config.root_domain.clone());
        let shaper = ResponseShaper::new(&config.server_name).expect("valid server name");
        let service = EdgeHttpService::new(resolver, build_origin(config), shaper);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind edge");
        let addr = listener.local_addr().expect("edge addr");
        let task = tokio::spawn(async move {
            let http = HttpConnBuilder::new(TokioExecutor::new());
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                let conn = http
                    .serve_connection(TokioIo::new(stream), service.clone())
                    .into_owned();
                tokio::spawn(async move {
                    let _ = conn.await;
                });
            }
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            routing,
            task,
        }
    }

    /// Routing table the gateway reads.
    #[must_use]
    pub fn routing(&self) -> &MemoryRoutingStore {
        &self.routing
    }

    /// Bind `label` under the root domain to `site` and activate `deployment`.
    pub fn deploy(&self, label: &str, site: &str, deployment: &str) {
        let site = boop_edge_core::SiteId::new(site);
        self.routing.bind_host(label, &site);
        self.routing
            .set_active_deployment(&site, &boop_edge_core::DeploymentId::new(deployment));
    }

    /// GET `path` as if addressed to `host` through a proxy.
    pub async fn get(&self, host: &str, path: &str) -> reqwest::Response {
        self.client
            .get(format!("http://{}{path}", self.addr))
            .header("x-forwarded-host", host)
            .send()
            .await
            .expect("edge request")
    }

    /// GET with an explicit `accept-encoding`.
    pub async fn get_encoded(&self, host: &str, path: &str, encoding: &str) -> reqwest::Response {
        self.client
            .get(format!("http://{}{path}", self.addr))
            .header("x-forwarded-host", host)
            .header("accept-encoding", encoding)
            .send()
            .await
            .expect("edge request")
    }
}

impl Drop for EdgeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn build_origin(config: &EdgeConfig) -> boop_edge_core::EdgeResult<StorageOrigin> {
    let storage = config.storage()?;
    let timeouts = config.upstream_timeouts();
    let credentials = CredentialCache::from_storage(&storage, timeouts)?;
    let fetcher = B2ObjectFetcher::new(storage.bucket_name, timeouts)?;
    Ok(StorageOrigin::new(Arc::new(credentials), Arc::new(fetcher)))
}
