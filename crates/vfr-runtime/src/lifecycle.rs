//! The Lifecycle Controller: owns `RuntimeState`, the live engine, and the
//! app scope, and drives auto-boot and explicit (re)initialization.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use vfr_cache::{Cache, StateCache};
use vfr_engine::{EngineFacade, InMemoryEngine, Manifest};

use crate::error::RuntimeError;

/// How many times the probe loop polls the sync-probe directory before
/// giving up (non-fatally — a probe timeout is a warning, not a failure).
const PROBE_ATTEMPTS: u32 = 20;
const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// The sync-probe path; the spec mandates `/` for current implementations.
const PROBE_PATH: &str = "/";

/// How long `init` polls for an in-flight `loadBundle`/`initializeFromUrl`
/// to settle before giving up (`spec.md` §5: "additional init calls await
/// the pending promise and reply with its outcome").
const INIT_WAIT_ATTEMPTS: u32 = 40;
const INIT_WAIT_INTERVAL: Duration = Duration::from_millis(50);

/// Fetches bundle bytes (and optionally a manifest/wasm asset) from a URL.
///
/// The real engine's `initializeFromUrl` path needs a network fetch; this
/// trait lets the runtime stay testable with a stub while `vfr-server`
/// wires in an HTTP-backed implementation.
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    /// Fetch a bundle's raw bytes from `url`.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure (network error, non-2xx
    /// status, etc).
    async fn fetch_bundle(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// [`BundleFetcher`] backed by a real HTTP client.
pub struct HttpBundleFetcher {
    client: reqwest::Client,
}

impl HttpBundleFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpBundleFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BundleFetcher for HttpBundleFetcher {
    async fn fetch_bundle(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| e.to_string())
    }
}

/// Tagged state of the runtime, per `spec.md` §3.
///
/// Transitions are one-way except `Failed` may return to `Loading` via a
/// fresh `loadBundle`/`initializeFromUrl`, and `Uninitialized` may be
/// entered from any state by a root-navigation reset.
#[derive(Debug)]
pub enum RuntimeState {
    Uninitialized,
    Loading,
    Ready { manifest: Manifest },
    Failed { error: String },
}

impl RuntimeState {
    /// Short tag for the `/healthz` liveness endpoint.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready { .. } => "ready",
            Self::Failed { .. } => "failed",
        }
    }
}

fn ws_url_from_http(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// Owns `RuntimeState`, the live engine, and the app scope. The single
/// seam through which bundles are loaded and torn down.
pub struct LifecycleController {
    state: RwLock<RuntimeState>,
    engine: RwLock<Option<Arc<dyn EngineFacade>>>,
    scope: RwLock<Option<String>>,
    server_url: RwLock<Option<String>>,
    ws_url: RwLock<Option<String>>,
    cache: StateCache,
    generation: AtomicU64,
    fetcher: Arc<dyn BundleFetcher>,
}

impl LifecycleController {
    #[must_use]
    pub fn new(cache: &dyn Cache, fetcher: Arc<dyn BundleFetcher>) -> Self {
        Self {
            state: RwLock::new(RuntimeState::Uninitialized),
            engine: RwLock::new(None),
            scope: RwLock::new(None),
            server_url: RwLock::new(None),
            ws_url: RwLock::new(None),
            cache: StateCache::new(cache),
            generation: AtomicU64::new(0),
            fetcher,
        }
    }

    /// Short tag for the current state (`/healthz`).
    pub async fn tag(&self) -> &'static str {
        self.state.read().await.tag()
    }

    /// Whether the runtime is currently `Ready`.
    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.read().await, RuntimeState::Ready { .. })
    }

    /// Wait for an in-flight `loadBundle`/`initializeFromUrl` to settle and
    /// report its outcome (`init`'s idempotency note, `spec.md` §4.4/§5).
    /// If no load is in progress when called, there is nothing to wait for
    /// and this returns `Ok(())` immediately — `init` is just an ack.
    pub async fn await_pending_load(&self) -> Result<(), String> {
        if !matches!(*self.state.read().await, RuntimeState::Loading) {
            return Ok(());
        }
        for _ in 0..INIT_WAIT_ATTEMPTS {
            match &*self.state.read().await {
                RuntimeState::Loading => {}
                RuntimeState::Failed { error } => return Err(error.clone()),
                RuntimeState::Ready { .. } | RuntimeState::Uninitialized => return Ok(()),
            }
            tokio::time::sleep(INIT_WAIT_INTERVAL).await;
        }
        Err("timed out waiting for in-flight load".to_string())
    }

    /// The live engine, if the runtime is `Ready`.
    pub async fn engine(&self) -> Option<Arc<dyn EngineFacade>> {
        self.engine.read().await.clone()
    }

    /// The currently set app scope (slug), if any.
    pub async fn scope(&self) -> Option<String> {
        self.scope.read().await.clone()
    }

    /// The websocket url derived from the last loaded bundle's server url.
    pub async fn ws_url(&self) -> Option<String> {
        self.ws_url.read().await.clone()
    }

    /// The last loaded bundle's server url, as given to `loadBundle` or
    /// `initializeFromUrl` (`getServerUrl`).
    pub async fn server_url(&self) -> Option<String> {
        self.server_url.read().await.clone()
    }

    /// Set the app scope explicitly (`setAppSlug`), persisting it.
    pub async fn set_app_slug(&self, slug: String) {
        self.cache.set_app_slug(&slug);
        *self.scope.write().await = Some(slug);
    }

    /// Clear the app scope, persisting the clearance (root-navigation
    /// reset, invariant 4 in `spec.md` §8).
    pub async fn reset_scope(&self) {
        self.cache.clear();
        *self.scope.write().await = None;
    }

    /// Attempt to rehydrate from the persistent cache. Returns whether
    /// auto-boot succeeded; activation broadcasts a readiness envelope
    /// whose `autoInitialized` field equals this value.
    pub async fn auto_boot(&self) -> bool {
        let (Some(slug), Some(bytes), Some(url)) = (
            self.cache.app_slug(),
            self.cache.bundle_bytes(),
            self.cache.server_url(),
        ) else {
            return false;
        };

        *self.scope.write().await = Some(slug);
        match self.install_bundle(&bytes, Some(&url), false).await {
            Ok(Some(_)) => true,
            _ => {
                self.cache.clear();
                *self.scope.write().await = None;
                *self.state.write().await = RuntimeState::Uninitialized;
                false
            }
        }
    }

    /// `loadBundle` — build a fresh engine from `bundle_bytes`, replacing
    /// whatever engine is currently live.
    ///
    /// Returns `Ok(None)` if this call was superseded by a later
    /// `loadBundle`/`initializeFromUrl` before it could install its
    /// result; per `spec.md` §9 Open Question (i), the superseded
    /// outcome is not surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Engine`] if `bundle_bytes` is not a
    /// well-formed bundle.
    pub async fn load_bundle(
        &self,
        bundle_bytes: Vec<u8>,
        server_url: Option<String>,
    ) -> Result<Option<Manifest>, RuntimeError> {
        self.install_bundle(&bundle_bytes, server_url.as_deref(), true)
            .await
    }

    /// `initializeFromUrl` — fetch a bundle from `manifest_url` (falling
    /// back to `wasm_url` if given, matching the source's two optional
    /// fetch targets) and install it the same way `load_bundle` does.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Fetch`] if the bundle could not be
    /// retrieved, or [`RuntimeError::Engine`] if it is malformed.
    pub async fn initialize_from_url(
        &self,
        manifest_url: Option<String>,
        wasm_url: Option<String>,
        ws_url: Option<String>,
    ) -> Result<Option<Manifest>, RuntimeError> {
        let fetch_url = manifest_url
            .or(wasm_url)
            .ok_or_else(|| RuntimeError::Fetch("no manifestUrl or wasmUrl given".to_string()))?;
        let bytes = self
            .fetcher
            .fetch_bundle(&fetch_url)
            .await
            .map_err(RuntimeError::Fetch)?;
        self.install_bundle(&bytes, ws_url.as_deref(), true).await
    }

    async fn install_bundle(
        &self,
        bundle_bytes: &[u8],
        server_url: Option<&str>,
        persist: bool,
    ) -> Result<Option<Manifest>, RuntimeError> {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.write().await = RuntimeState::Loading;
        // Suspension point: gives a concurrent loadBundle/initializeFromUrl
        // a chance to claim a later generation and supersede this call
        // before it commits its result.
        tokio::task::yield_now().await;

        let built = InMemoryEngine::from_bytes(bundle_bytes);

        if self.generation.load(Ordering::SeqCst) != my_generation {
            return Ok(None);
        }

        let engine = match built {
            Ok(engine) => engine,
            Err(err) => {
                let err = RuntimeError::from(err);
                *self.state.write().await = RuntimeState::Failed {
                    error: err.to_string(),
                };
                return Err(err);
            }
        };

        self.probe_until_synced(&engine).await;

        let manifest = match engine.manifest() {
            Ok(manifest) => manifest,
            Err(err) => {
                let err = RuntimeError::from(err);
                *self.state.write().await = RuntimeState::Failed {
                    error: err.to_string(),
                };
                return Err(err);
            }
        };

        if self.generation.load(Ordering::SeqCst) != my_generation {
            return Ok(None);
        }

        *self.engine.write().await = Some(Arc::new(engine));
        if let Some(url) = server_url {
            *self.server_url.write().await = Some(url.to_string());
            *self.ws_url.write().await = Some(ws_url_from_http(url));
        }
        *self.state.write().await = RuntimeState::Ready {
            manifest: manifest.clone(),
        };

        if persist {
            self.cache.set_bundle_bytes(bundle_bytes);
            if let Some(slug) = self.scope.read().await.as_deref() {
                self.cache.set_app_slug(slug);
            }
            if let Some(url) = server_url {
                self.cache.set_server_url(url);
            }
        }

        Ok(Some(manifest))
    }

    /// Poll `PROBE_PATH` until it exists, up to `PROBE_ATTEMPTS` times.
    /// Timing out is a warning, never a failure.
    async fn probe_until_synced(&self, engine: &dyn EngineFacade) {
        for _ in 0..PROBE_ATTEMPTS {
            if engine.exists(PROBE_PATH) {
                return;
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
        tracing::warn!(path = PROBE_PATH, "probe directory did not sync within budget");
    }

    /// Force the live engine to `engine`, `Ready` with `manifest`, bypassing
    /// `loadBundle`/`initializeFromUrl`. A testing hook for exercising
    /// components (the Health Monitor) that need a controllable engine
    /// identity rather than one rebuilt from bundle bytes.
    pub async fn set_engine_for_test(&self, engine: Arc<dyn EngineFacade>, manifest: Manifest) {
        *self.engine.write().await = Some(engine);
        *self.state.write().await = RuntimeState::Ready { manifest };
    }

    /// Tear down the live engine and cancel background reconnection. Does
    /// not clear the persistent cache or app scope.
    pub async fn shutdown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.engine.write().await = None;
        *self.state.write().await = RuntimeState::Uninitialized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vfr_cache::NullCache;

    struct StubFetcher {
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl BundleFetcher for StubFetcher {
        async fn fetch_bundle(&self, _url: &str) -> Result<Vec<u8>, String> {
            Ok(self.bytes.clone())
        }
    }

    fn sample_bundle() -> Vec<u8> {
        let engine = InMemoryEngine::new();
        engine
            .create_file("/x", serde_json::json!({"mime": "text/plain"}))
            .unwrap();
        engine.to_bytes().unwrap().bytes
    }

    #[tokio::test]
    async fn starts_uninitialized() {
        let cache = NullCache;
        let controller = LifecycleController::new(&cache, Arc::new(HttpBundleFetcher::new()));
        assert_eq!(controller.tag().await, "uninitialized");
        assert!(!controller.is_ready().await);
    }

    #[tokio::test]
    async fn auto_boot_with_empty_cache_fails() {
        let cache = NullCache;
        let controller = LifecycleController::new(&cache, Arc::new(HttpBundleFetcher::new()));
        assert!(!controller.auto_boot().await);
        assert_eq!(controller.tag().await, "uninitialized");
    }

    #[tokio::test]
    async fn load_bundle_transitions_to_ready() {
        let cache = NullCache;
        let controller = LifecycleController::new(&cache, Arc::new(HttpBundleFetcher::new()));
        let manifest = controller
            .load_bundle(sample_bundle(), Some("http://localhost:3000".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(controller.tag().await, "ready");
        assert!(controller.is_ready().await);
        assert_eq!(
            controller.engine().await.unwrap().manifest().unwrap().root_id,
            manifest.root_id
        );
        assert_eq!(
            controller.ws_url().await.as_deref(),
            Some("ws://localhost:3000")
        );
    }

    #[tokio::test]
    async fn load_bundle_with_garbage_bytes_fails() {
        let cache = NullCache;
        let controller = LifecycleController::new(&cache, Arc::new(HttpBundleFetcher::new()));
        let err = controller.load_bundle(b"not a bundle".to_vec(), None).await;
        assert!(err.is_err());
        assert_eq!(controller.tag().await, "failed");
    }

    #[tokio::test]
    async fn auto_boot_rehydrates_from_cache() {
        use vfr_cache::FileCache;
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let state = StateCache::new(&cache);
        state.set_app_slug("app");
        state.set_bundle_bytes(&sample_bundle());
        state.set_server_url("http://localhost:3000");

        let controller = LifecycleController::new(&cache, Arc::new(HttpBundleFetcher::new()));
        assert!(controller.auto_boot().await);
        assert_eq!(controller.scope().await.as_deref(), Some("app"));
        assert_eq!(controller.tag().await, "ready");
    }

    #[tokio::test]
    async fn initialize_from_url_fetches_and_installs() {
        let cache = NullCache;
        let fetcher = Arc::new(StubFetcher {
            bytes: sample_bundle(),
        });
        let controller = LifecycleController::new(&cache, fetcher);
        let manifest = controller
            .initialize_from_url(
                Some("http://example.com/manifest".to_string()),
                None,
                Some("ws://example.com".to_string()),
            )
            .await
            .unwrap();
        assert!(manifest.is_some());
        assert_eq!(controller.tag().await, "ready");
    }

    #[tokio::test]
    async fn superseded_load_is_dropped_silently() {
        let cache = NullCache;
        let controller = Arc::new(LifecycleController::new(
            &cache,
            Arc::new(HttpBundleFetcher::new()),
        ));

        let first_controller = Arc::clone(&controller);
        let first = tokio::spawn(async move {
            first_controller.load_bundle(sample_bundle(), None).await
        });
        // Let the spawned call claim its generation and hit its own
        // suspension point before we race ahead of it.
        tokio::task::yield_now().await;

        let second_manifest = controller
            .load_bundle(sample_bundle(), None)
            .await
            .unwrap()
            .unwrap();

        let first_result = first.await.unwrap().unwrap();
        assert!(
            first_result.is_none(),
            "the superseded load must not surface a result"
        );
        assert_eq!(
            controller.engine().await.unwrap().manifest().unwrap().root_id,
            second_manifest.root_id
        );
    }

    #[tokio::test]
    async fn shutdown_clears_engine() {
        let cache = NullCache;
        let controller = LifecycleController::new(&cache, Arc::new(HttpBundleFetcher::new()));
        controller.load_bundle(sample_bundle(), None).await.unwrap();
        controller.shutdown().await;
        assert_eq!(controller.tag().await, "uninitialized");
        assert!(controller.engine().await.is_none());
    }

    #[tokio::test]
    async fn set_and_reset_app_slug() {
        let cache = NullCache;
        let controller = LifecycleController::new(&cache, Arc::new(HttpBundleFetcher::new()));
        controller.set_app_slug("docs".to_string()).await;
        assert_eq!(controller.scope().await.as_deref(), Some("docs"));
        controller.reset_scope().await;
        assert_eq!(controller.scope().await, None);
    }
}
