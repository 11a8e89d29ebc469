//! boop edge server: serves tenant static sites from the object store.
//!
//! Resolves each request's hostname to a site and its active deployment,
//! walks the fallback chain over the deployment's object keys, and streams
//! the first hit back with cache and diagnostic headers.
//!
//! # Usage
//!
//! ```text
//! B2_DOWNLOAD_BASE=https://f000.backblazeb2.com B2_BUCKET_NAME=boop-sites \
//!   ROUTING_BACKEND=file ROUTING_FILE=routing.json boop-edge-server
//! ```
//!
//! See [`EdgeConfig::from_env`] for the full variable table. `RUST_LOG`
//! overrides `LOG_LEVEL`; `LOG_FORMAT=json` switches to JSON logs.

mod wiring;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use boop_edge_core::EdgeConfig;
use boop_edge_http::EdgeHttpService;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str, log_format: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("received shutdown signal, draining connections");
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: EdgeHttpService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Address the local health probe connects to.
fn probe_address(listen: &str) -> String {
    listen.replace("0.0.0.0", "127.0.0.1")
}

/// Request the liveness endpoint over a raw TCP connection.
///
/// Exits with code 0 if healthy, 1 otherwise.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n",
        boop_edge_http::service::HEALTH_PATH
    );
    writer.write_all(request.as_bytes()).await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"status\":\"ok\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = EdgeConfig::from_env();
        let healthy = run_health_check(&probe_address(&config.listen)).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = EdgeConfig::from_env();

    init_tracing(&config.log_level, &config.log_format)?;

    info!(
        listen = %config.listen,
        root_domain = ?config.root_domain,
        routing_backend = ?config.routing_backend,
        version = VERSION,
        "starting boop edge server",
    );

    let service = wiring::build_service(&config)?;

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, ready = service.is_ready(), "listening for connections");

    serve(listener, service).await
}
