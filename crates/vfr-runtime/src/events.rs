//! Broadcast envelopes: unsolicited messages fanned out to every connected
//! client, as opposed to the correlated per-request responses in
//! [`crate::rpc`].

use serde::Serialize;
use vfr_engine::{ChangeKind, DocumentData};

/// A change kind as it crosses the RPC boundary.
fn change_kind_wire(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Created => "created",
        ChangeKind::Modified => "modified",
        ChangeKind::Removed => "removed",
    }
}

/// Unsolicited events pushed to every connected client.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Sent once on activation; `autoInitialized` mirrors whether
    /// auto-boot from the persistent cache succeeded.
    Ready {
        auto_initialized: bool,
        needs_bundle: bool,
    },
    /// Sent when an explicit `loadBundle`/`initializeFromUrl` completes.
    SwReady,
    /// Fired for a `watchFile` subscription whose path changed.
    FileChanged {
        watch_id: String,
        document_data: Option<DocumentData>,
    },
    /// Fired for a `watchDirectory` subscription whose subtree changed.
    DirectoryChanged {
        watch_id: String,
        path: String,
        change_data: String,
    },
    /// Sent once watcher re-subscription finishes after a reconnect.
    WatchersReestablished { count: usize },
    /// Health Monitor: the engine's liveness probe started failing.
    Disconnected,
    /// Health Monitor: a reconnection attempt is in flight.
    Reconnecting { attempt: u32 },
    /// Health Monitor: liveness is restored.
    Reconnected,
    /// Health Monitor: the reconnect attempt budget was exhausted.
    ReconnectionFailed,
}

impl BroadcastEvent {
    pub(crate) fn file_changed(watch_id: impl Into<String>, document: Option<DocumentData>) -> Self {
        Self::FileChanged {
            watch_id: watch_id.into(),
            document_data: document,
        }
    }

    pub(crate) fn directory_changed(watch_id: impl Into<String>, path: impl Into<String>, kind: ChangeKind) -> Self {
        Self::DirectoryChanged {
            watch_id: watch_id.into(),
            path: path.into(),
            change_data: change_kind_wire(kind).to_string(),
        }
    }
}
