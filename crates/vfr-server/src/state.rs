//! Application state.
//!
//! Shared state for all request handlers.

use std::sync::Arc;

use vfr_runtime::Runtime;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// The runtime: lifecycle, RPC dispatch, watches, health monitoring.
    pub(crate) runtime: Arc<Runtime>,
    /// The worker's registration scope prefix, stripped before `AppScope`
    /// matching (empty if registered at `/`).
    pub(crate) registration_scope: String,
    /// Dev-proxy upstream origin, if `server.dev_proxy` is enabled.
    pub(crate) dev_proxy_upstream: Option<String>,
    /// HTTP client used to forward dev-proxy requests.
    pub(crate) http_client: reqwest::Client,
}
