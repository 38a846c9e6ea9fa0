//! Watch subscription types.
//!
//! A call to [`crate::EngineFacade::watch_file`] or
//! [`crate::EngineFacade::watch_directory`] returns a [`ChangeReceiver`] for
//! the event stream and a [`Subscription`] handle. Dropping (or explicitly
//! stopping) the subscription removes it from the engine's watch list;
//! both paths are idempotent.

use std::sync::{mpsc, Arc, Mutex, Weak};

use crate::types::ChangeEvent;

/// What a registered watch matches against.
pub(crate) enum Target {
    File(String),
    Directory(String),
}

/// A single active watch registration inside the engine.
pub(crate) struct WatchReg {
    pub(crate) id: u64,
    pub(crate) target: Target,
    pub(crate) tx: mpsc::Sender<ChangeEvent>,
}

pub(crate) type WatchList = Arc<Mutex<Vec<WatchReg>>>;

/// Receiver for change events from a single watch subscription.
pub struct ChangeReceiver {
    rx: mpsc::Receiver<ChangeEvent>,
}

impl ChangeReceiver {
    pub(crate) fn new(rx: mpsc::Receiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next change event (blocking).
    ///
    /// Returns `None` once the subscription is stopped.
    #[must_use]
    pub fn recv(&self) -> Option<ChangeEvent> {
        self.rx.recv().ok()
    }

    /// Iterate over change events until the subscription is stopped.
    pub fn iter(&self) -> impl Iterator<Item = ChangeEvent> + '_ {
        self.rx.iter()
    }
}

/// Handle to a watch subscription.
///
/// Dropping or calling [`stop`](Self::stop) removes the registration from
/// the owning engine's watch list. Both are idempotent: stopping twice, or
/// stopping then dropping, has no additional effect.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Vec<WatchReg>>>,
}

impl Subscription {
    pub(crate) fn new(id: u64, registry: &WatchList) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Stop the subscription immediately.
    pub fn stop(self) {
        self.remove();
    }

    fn remove(&self) {
        if let Some(list) = self.registry.upgrade() {
            list.lock().unwrap().retain(|w| w.id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_list() -> WatchList {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn stop_removes_registration() {
        let list = make_list();
        let (tx, _rx) = mpsc::channel();
        list.lock().unwrap().push(WatchReg {
            id: 1,
            target: Target::File("/a".to_string()),
            tx,
        });

        let sub = Subscription::new(1, &list);
        assert_eq!(list.lock().unwrap().len(), 1);
        sub.stop();
        assert_eq!(list.lock().unwrap().len(), 0);
    }

    #[test]
    fn double_stop_is_idempotent() {
        let list = make_list();
        let (tx, _rx) = mpsc::channel();
        list.lock().unwrap().push(WatchReg {
            id: 7,
            target: Target::Directory("/dir".to_string()),
            tx,
        });

        let id = 7;
        let sub1 = Subscription::new(id, &list);
        sub1.stop();
        // A second "unwatch" with no matching registration left must not panic.
        let sub2 = Subscription::new(id, &list);
        sub2.stop();
        assert!(list.lock().unwrap().is_empty());
    }

    #[test]
    fn drop_also_removes_registration() {
        let list = make_list();
        let (tx, _rx) = mpsc::channel();
        list.lock().unwrap().push(WatchReg {
            id: 3,
            target: Target::File("/a".to_string()),
            tx,
        });

        {
            let _sub = Subscription::new(3, &list);
        }
        assert!(list.lock().unwrap().is_empty());
    }

    #[test]
    fn subscription_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Subscription>();
        assert_send::<ChangeReceiver>();
    }
}
