//! The Watch Registry: live watch-id → subscription bookkeeping, change
//! fan-out to the broadcast channel, and post-reconnect re-subscription.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use vfr_engine::{EngineFacade, Subscription};

use crate::events::BroadcastEvent;

#[derive(Clone)]
enum WatchTarget {
    File(String),
    Directory(String),
}

struct Entry {
    target: WatchTarget,
    subscription: Subscription,
}

/// Owns every live watch subscription and fans its change events out to
/// all connected clients via `events`.
pub struct WatchRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    events: broadcast::Sender<BroadcastEvent>,
}

impl WatchRegistry {
    #[must_use]
    pub fn new(events: broadcast::Sender<BroadcastEvent>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Number of currently active watches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `watchFile` — subscribe `watch_id` to changes at `path`.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if `path` is malformed.
    pub fn watch_file(
        &self,
        watch_id: String,
        path: String,
        engine: &dyn EngineFacade,
    ) -> Result<(), vfr_engine::EngineError> {
        let (rx, sub) = engine.watch_file(&path)?;
        self.register(watch_id.clone(), WatchTarget::File(path), sub);
        self.spawn_forwarder(watch_id, rx, true);
        Ok(())
    }

    /// `watchDirectory` — subscribe `watch_id` to changes anywhere beneath
    /// `path`.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if `path` is malformed.
    pub fn watch_directory(
        &self,
        watch_id: String,
        path: String,
        engine: &dyn EngineFacade,
    ) -> Result<(), vfr_engine::EngineError> {
        let (rx, sub) = engine.watch_directory(&path)?;
        self.register(watch_id.clone(), WatchTarget::Directory(path), sub);
        self.spawn_forwarder(watch_id, rx, false);
        Ok(())
    }

    /// `unwatchFile`/`unwatchDirectory` — idempotent. Unknown ids are
    /// logged as a warning and treated as success, per `spec.md` §4.5.
    pub fn unwatch(&self, watch_id: &str) {
        let entry = self.entries.lock().unwrap().remove(watch_id);
        match entry {
            Some(entry) => entry.subscription.stop(),
            None => tracing::warn!(watch_id, "unwatch for unknown watch id"),
        }
    }

    /// Re-subscribe every currently registered watch against a freshly
    /// (re)connected `engine`, then broadcast `watchersReestablished`.
    ///
    /// Called by the Health Monitor once a reconnect attempt succeeds.
    pub fn reestablish(&self, engine: &dyn EngineFacade) {
        let targets: Vec<(String, WatchTarget)> = {
            let entries = self.entries.lock().unwrap();
            entries
                .iter()
                .map(|(id, entry)| (id.clone(), entry.target.clone()))
                .collect()
        };

        let mut count = 0;
        for (watch_id, target) in targets {
            let result = match &target {
                WatchTarget::File(path) => engine.watch_file(path),
                WatchTarget::Directory(path) => engine.watch_directory(path),
            };
            match result {
                Ok((rx, sub)) => {
                    let is_file = matches!(target, WatchTarget::File(_));
                    self.register(watch_id.clone(), target, sub);
                    self.spawn_forwarder(watch_id, rx, is_file);
                    count += 1;
                }
                Err(err) => {
                    tracing::warn!(watch_id, %err, "failed to re-establish watcher after reconnect");
                }
            }
        }

        let _ = self.events.send(BroadcastEvent::WatchersReestablished { count });
    }

    fn register(&self, watch_id: String, target: WatchTarget, subscription: Subscription) {
        self.entries
            .lock()
            .unwrap()
            .insert(watch_id, Entry { target, subscription });
    }

    /// Run a blocking forwarder loop that relays engine change events for a
    /// single watch onto the broadcast channel, exiting once the engine
    /// drops the subscription (on explicit unwatch or engine replacement).
    fn spawn_forwarder(&self, watch_id: String, rx: vfr_engine::ChangeReceiver, is_file: bool) {
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            while let Some(event) = rx.recv() {
                let broadcast_event = if is_file {
                    BroadcastEvent::file_changed(&watch_id, event.document)
                } else {
                    BroadcastEvent::directory_changed(&watch_id, event.path, event.kind)
                };
                let _ = events.send(broadcast_event);
            }
        });
    }
}
