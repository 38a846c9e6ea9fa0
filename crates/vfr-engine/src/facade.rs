//! The engine facade trait.
//!
//! [`EngineFacade`] is the one seam through which the runtime touches the
//! CRDT document tree. The real engine is an external collaborator reached
//! over a websocket relay; [`crate::memory::InMemoryEngine`] is a
//! deterministic in-process stand-in implementing the same contract so the
//! rest of the runtime is testable without it.

use crate::error::EngineError;
use crate::types::{DocumentData, Manifest, RefNode, SerializedState};
use crate::watch::{ChangeReceiver, Subscription};

/// Operations the runtime performs against the document tree.
///
/// All paths are absolute (`/`-rooted) VFS paths, scoped beneath whatever
/// app slug the caller has already stripped — the facade itself knows
/// nothing about scopes.
pub trait EngineFacade: Send + Sync {
    /// Whether the engine currently has a live connection to its backing
    /// collaborator (for an in-process engine this is "has a bundle been
    /// loaded").
    fn is_connected(&self) -> bool;

    /// (Re)establish the collaborator connection at `url`. Used by the
    /// Health Monitor's reconnect loop; a fresh `loadBundle` never calls
    /// this directly, it builds a new engine instead.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::NotConnected`] if the connection
    /// attempt fails.
    fn connect_websocket(&self, url: &str) -> Result<(), EngineError>;

    /// Manifest describing the currently loaded document tree.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::NotConnected`] if no bundle has
    /// been loaded yet.
    fn manifest(&self) -> Result<Manifest, EngineError>;

    /// Read a file's content and optional bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::NotFound`] if `path` does not name
    /// a file, [`crate::EngineErrorKind::InvalidPath`] if `path` is
    /// malformed.
    fn read_file(&self, path: &str) -> Result<DocumentData, EngineError>;

    /// Create a text file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::AlreadyExists`] if `path` is
    /// already occupied.
    fn create_file(&self, path: &str, content: serde_json::Value) -> Result<(), EngineError>;

    /// Create a binary file at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_file`].
    fn create_file_with_bytes(
        &self,
        path: &str,
        content: serde_json::Value,
        bytes: &[u8],
    ) -> Result<(), EngineError>;

    /// Overwrite the content of an existing text file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::NotFound`] if `path` does not
    /// exist.
    fn update_file(&self, path: &str, content: serde_json::Value) -> Result<(), EngineError>;

    /// Overwrite the content and bytes of an existing binary file.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update_file`].
    fn update_file_with_bytes(
        &self,
        path: &str,
        content: serde_json::Value,
        bytes: &[u8],
    ) -> Result<(), EngineError>;

    /// Remove a file or empty directory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::NotFound`] if `path` does not
    /// exist.
    fn delete_file(&self, path: &str) -> Result<(), EngineError>;

    /// Move/rename a path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::NotFound`] if `from` does not
    /// exist, [`crate::EngineErrorKind::AlreadyExists`] if `to` is already
    /// occupied.
    fn rename(&self, from: &str, to: &str) -> Result<(), EngineError>;

    /// Whether `path` currently names a file or directory.
    fn exists(&self, path: &str) -> bool;

    /// List the direct children of a directory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::NotFound`] if `path` does not name
    /// a directory.
    fn list_directory(&self, path: &str) -> Result<Vec<RefNode>, EngineError>;

    /// Subscribe to changes at an exact file path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::InvalidPath`] if `path` is
    /// malformed.
    fn watch_file(&self, path: &str) -> Result<(ChangeReceiver, Subscription), EngineError>;

    /// Subscribe to changes anywhere beneath a directory, recursively.
    ///
    /// # Errors
    ///
    /// Same as [`Self::watch_file`].
    fn watch_directory(&self, path: &str) -> Result<(ChangeReceiver, Subscription), EngineError>;

    /// Serialize the current document tree to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::NotConnected`] if no bundle has
    /// been loaded.
    fn to_bytes(&self) -> Result<SerializedState, EngineError>;

    /// Serialize a forked copy of the document tree under a freshly
    /// generated root id, leaving this engine's own tree untouched.
    ///
    /// # Errors
    ///
    /// Same as [`Self::to_bytes`].
    fn fork_to_bytes(&self) -> Result<SerializedState, EngineError>;
}

/// Bundle introspection, independent of holding a live engine.
///
/// Distilling a manifest from bundle bytes is cheap and doesn't require
/// spinning up a full engine — the Lifecycle Controller uses this to decide
/// whether a `loadBundle` payload is well-formed before committing to it.
pub struct Bundle {
    manifest: Manifest,
}

impl Bundle {
    /// Parse a bundle's manifest from its serialized bytes without loading
    /// the full document tree into an engine.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineErrorKind::Other`] if `bytes` is not a
    /// well-formed bundle.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let manifest = crate::memory::manifest_from_bundle(bytes)?;
        Ok(Self { manifest })
    }

    /// The parsed manifest.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEngine;

    #[test]
    fn bundle_from_bytes_reads_manifest() {
        let engine = InMemoryEngine::new();
        let state = engine.to_bytes().unwrap();
        let bundle = Bundle::from_bytes(&state.bytes).unwrap();
        assert_eq!(bundle.manifest().root_id, state.root_id);
    }
}
