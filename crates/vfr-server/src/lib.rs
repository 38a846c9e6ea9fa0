//! HTTP/WebSocket server exposing the virtual filesystem runtime.
//!
//! This crate provides a native Rust server using axum, serving:
//! - `GET /rpc`: the bidirectional RPC surface (lifecycle, file ops, watches)
//! - Everything else: the fetch path (Request Resolver → Response Assembler,
//!   or a dev-proxy forward)
//!
//! # Quick Start
//!
//! ```ignore
//! use vfr_server::run_server;
//! use vfr_config::Config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load(None, None).unwrap();
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► Rust axum server (vfr-server)
//!                        │
//!                        ├─► GET /rpc (WebSocket) ──► RpcDispatcher (vfr-runtime)
//!                        │
//!                        └─► fallback ──► Request Resolver ──► EngineFacade
//!                                              │                   │
//!                                              └── dev-proxy ──────┘
//! ```

mod app;
mod error;
mod fetch;
mod healthz;
mod middleware;
mod state;
mod transport;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use vfr_cache::{Cache, FileCache, NullCache};
use vfr_config::Config;
use vfr_runtime::{HttpBundleFetcher, Runtime};

use state::AppState;

/// Health-monitor reconnect policy for a long-lived server process: keep
/// retrying indefinitely rather than giving up after ten attempts.
const CONTINUOUS_RETRY: bool = true;

/// Run the server until it receives a shutdown signal.
///
/// # Errors
///
/// Returns an error if the server fails to bind or the runtime fails to
/// start.
pub async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let cache: Arc<dyn Cache> = if config.cache_resolved.enabled {
        Arc::new(FileCache::new(config.cache_resolved.dir.clone()))
    } else {
        Arc::new(NullCache)
    };

    let runtime = Arc::new(Runtime::new(
        cache.as_ref(),
        Arc::new(HttpBundleFetcher::new()),
        CONTINUOUS_RETRY,
    ));
    runtime.activate().await;

    let dev_proxy_upstream = if config.server.dev_proxy {
        config.server.bundle_origin.clone()
    } else {
        None
    };

    let state = Arc::new(AppState {
        runtime: Arc::clone(&runtime),
        registration_scope: String::new(),
        dev_proxy_upstream,
        http_client: reqwest::Client::new(),
    });

    let app = app::create_router(state);

    let addr = SocketAddr::from_str(&format!("{}:{}", config.server.host, config.server.port))?;
    tracing::info!(address = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.shutdown().await;
    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
