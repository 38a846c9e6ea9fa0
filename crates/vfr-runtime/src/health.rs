//! The Health Monitor: periodic liveness probing of the live engine, with
//! exponential-backoff reconnection and watcher replay on recovery
//! (`spec.md` §4.6).

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use vfr_engine::EngineFacade;

use crate::events::BroadcastEvent;
use crate::lifecycle::LifecycleController;
use crate::watch::WatchRegistry;

const PROBE_PERIOD: Duration = Duration::from_secs(5);
const POST_ATTEMPT_WAIT: Duration = Duration::from_secs(1);
const MAX_ATTEMPTS: u32 = 10;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Drives the liveness probe and reconnect state machine for the live
/// engine, broadcasting transitions to every connected client and
/// re-establishing watchers once a reconnect succeeds.
pub struct HealthMonitor {
    lifecycle: Arc<LifecycleController>,
    watches: Arc<WatchRegistry>,
    events: broadcast::Sender<BroadcastEvent>,
    continuous_retry: bool,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(
        lifecycle: Arc<LifecycleController>,
        watches: Arc<WatchRegistry>,
        events: broadcast::Sender<BroadcastEvent>,
        continuous_retry: bool,
    ) -> Self {
        Self {
            lifecycle,
            watches,
            events,
            continuous_retry,
            task: StdMutex::new(None),
        }
    }

    /// (Re)start the probe loop, cancelling whatever loop is already
    /// running. Engine replacement cancels the previous reconnect backoff
    /// (`spec.md` §5 Cancellation); callers restart the monitor after every
    /// successful `loadBundle`/`initializeFromUrl`.
    pub fn restart(self: &Arc<Self>) {
        self.stop();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.task.lock().unwrap() = Some(handle);
    }

    /// Cancel the probe loop, if running.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }

    async fn run(&self) {
        loop {
            tokio::time::sleep(PROBE_PERIOD).await;

            let Some(engine) = self.lifecycle.engine().await else {
                continue;
            };
            if engine.is_connected() {
                continue;
            }

            let _ = self.events.send(BroadcastEvent::Disconnected);
            if !self.reconnect_loop().await {
                // Gave up for good (no continuous retry, or the engine was
                // torn down mid-backoff); nothing left for this loop to do.
                return;
            }
        }
    }

    /// Increment-and-probe reconnect loop. Returns whether probing should
    /// continue: `true` on a successful reconnect, `false` once the
    /// attempt budget is exhausted (without continuous retry) or the
    /// engine disappears mid-backoff.
    async fn reconnect_loop(&self) -> bool {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if attempt > MAX_ATTEMPTS {
                if self.continuous_retry {
                    attempt = 0;
                    continue;
                }
                let _ = self.events.send(BroadcastEvent::ReconnectionFailed);
                return false;
            }

            let Some(engine) = self.lifecycle.engine().await else {
                return false;
            };

            let _ = self.events.send(BroadcastEvent::Reconnecting { attempt });
            let ws_url = self.lifecycle.ws_url().await.unwrap_or_default();
            let _ = engine.connect_websocket(&ws_url);
            tokio::time::sleep(POST_ATTEMPT_WAIT).await;

            if engine.is_connected() {
                let _ = self.events.send(BroadcastEvent::Reconnected);
                self.watches.reestablish(engine.as_ref());
                return true;
            }

            let backoff_ms =
                (2u64.saturating_pow(attempt.saturating_sub(1)) * 1000).min(MAX_BACKOFF_MS);
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vfr_cache::NullCache;
    use vfr_engine::{InMemoryEngine, Manifest};

    async fn fixture(continuous_retry: bool) -> (Arc<LifecycleController>, Arc<HealthMonitor>, Arc<InMemoryEngine>, broadcast::Receiver<BroadcastEvent>) {
        let cache = NullCache;
        let lifecycle = Arc::new(LifecycleController::new(
            &cache,
            Arc::new(crate::lifecycle::HttpBundleFetcher::new()),
        ));
        let engine = Arc::new(InMemoryEngine::new());
        engine.set_connected(true);
        lifecycle
            .set_engine_for_test(
                Arc::clone(&engine) as Arc<dyn EngineFacade>,
                Manifest::new("root-1", serde_json::Value::Null),
            )
            .await;

        let (tx, rx) = broadcast::channel(32);
        let watches = Arc::new(WatchRegistry::new(tx.clone()));
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&lifecycle),
            watches,
            tx,
            continuous_retry,
        ));
        (lifecycle, monitor, engine, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_then_reconnect_reestablishes_watchers() {
        let (_lifecycle, monitor, engine, mut rx) = fixture(false).await;
        monitor.restart();

        engine.set_connected(false);
        tokio::time::advance(PROBE_PERIOD + Duration::from_millis(10)).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            BroadcastEvent::Disconnected
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            BroadcastEvent::Reconnecting { attempt: 1 }
        ));

        // Flip back to healthy before the post-attempt probe.
        engine.set_connected(true);
        tokio::time::advance(POST_ATTEMPT_WAIT + Duration::from_millis(10)).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            BroadcastEvent::Reconnected
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            BroadcastEvent::WatchersReestablished { count: 0 }
        ));

        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn ten_failed_attempts_then_reconnection_failed() {
        let (_lifecycle, monitor, engine, mut rx) = fixture(false).await;
        monitor.restart();
        engine.set_connected(false);

        // Enough virtual time for the probe tick plus all ten reconnect
        // attempts and their backoffs (capped at 30s each) to play out, but
        // short of the next 5s probe tick the (by-then-exited) loop would
        // otherwise take.
        tokio::time::advance(Duration::from_secs(220)).await;

        let mut reconnecting_count = 0;
        let mut saw_failed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                BroadcastEvent::Disconnected => {}
                BroadcastEvent::Reconnecting { .. } => reconnecting_count += 1,
                BroadcastEvent::ReconnectionFailed => saw_failed = true,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(reconnecting_count, 10);
        assert!(saw_failed);

        monitor.stop();
    }
}
