//! The top-level `Runtime`: wires the Lifecycle Controller, RPC Dispatcher,
//! Watch Registry, and Health Monitor behind one handle, and drives
//! activation (`spec.md` §8 invariant 3).

use std::sync::Arc;

use tokio::sync::broadcast;
use vfr_cache::Cache;

use crate::events::BroadcastEvent;
use crate::health::HealthMonitor;
use crate::lifecycle::{BundleFetcher, LifecycleController};
use crate::rpc::RpcDispatcher;
use crate::watch::WatchRegistry;

/// Broadcast channel capacity; generous enough that a slow client doesn't
/// force a fast one to block, per the fan-out-without-backpressure model
/// in `spec.md` §5.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a transport (an HTTP/WebSocket server, a test harness) needs
/// to serve the runtime's RPC and fetch surfaces.
pub struct Runtime {
    pub lifecycle: Arc<LifecycleController>,
    pub dispatcher: RpcDispatcher,
    pub watches: Arc<WatchRegistry>,
    pub health: Arc<HealthMonitor>,
    events: broadcast::Sender<BroadcastEvent>,
}

impl Runtime {
    #[must_use]
    pub fn new(cache: &dyn Cache, fetcher: Arc<dyn BundleFetcher>, continuous_retry: bool) -> Self {
        let lifecycle = Arc::new(LifecycleController::new(cache, fetcher));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let watches = Arc::new(WatchRegistry::new(events.clone()));
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&lifecycle),
            Arc::clone(&watches),
            events.clone(),
            continuous_retry,
        ));
        let dispatcher = RpcDispatcher::new(
            Arc::clone(&lifecycle),
            Arc::clone(&watches),
            Arc::clone(&health),
            events.clone(),
        );
        Self {
            lifecycle,
            dispatcher,
            watches,
            health,
            events,
        }
    }

    /// Subscribe to every broadcast envelope (`fileChanged`, health
    /// transitions, the readiness handshake).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.events.subscribe()
    }

    /// Attempt auto-boot from the persistent cache, then emit exactly one
    /// readiness broadcast whose `autoInitialized` field mirrors the
    /// outcome (`spec.md` §8 invariant 3). Starts the Health Monitor if
    /// auto-boot succeeded.
    pub async fn activate(&self) {
        let auto_initialized = self.lifecycle.auto_boot().await;
        if auto_initialized {
            self.health.restart();
        }
        let _ = self.events.send(BroadcastEvent::Ready {
            auto_initialized,
            needs_bundle: !auto_initialized,
        });
    }

    /// Tear down the live engine and stop the Health Monitor, for graceful
    /// process exit.
    pub async fn shutdown(&self) {
        self.health.stop();
        self.lifecycle.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::HttpBundleFetcher;
    use vfr_cache::NullCache;
    use vfr_engine::InMemoryEngine;

    #[tokio::test]
    async fn activate_with_empty_cache_broadcasts_needs_bundle() {
        let cache = NullCache;
        let runtime = Runtime::new(&cache, Arc::new(HttpBundleFetcher::new()), false);
        let mut rx = runtime.subscribe();

        runtime.activate().await;

        match rx.recv().await.unwrap() {
            BroadcastEvent::Ready {
                auto_initialized,
                needs_bundle,
            } => {
                assert!(!auto_initialized);
                assert!(needs_bundle);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn activate_rehydrates_from_cache_and_starts_health_monitor() {
        use vfr_cache::{FileCache, StateCache};

        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let state = StateCache::new(&cache);
        let engine = InMemoryEngine::new();
        state.set_app_slug("app");
        state.set_bundle_bytes(&engine.to_bytes().unwrap().bytes);
        state.set_server_url("http://localhost:3000");

        let runtime = Runtime::new(&cache, Arc::new(HttpBundleFetcher::new()), false);
        let mut rx = runtime.subscribe();

        runtime.activate().await;

        match rx.recv().await.unwrap() {
            BroadcastEvent::Ready {
                auto_initialized,
                needs_bundle,
            } => {
                assert!(auto_initialized);
                assert!(!needs_bundle);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
        assert!(runtime.lifecycle.is_ready().await);

        runtime.shutdown().await;
    }
}
