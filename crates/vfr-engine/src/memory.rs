//! Deterministic in-process reference engine.
//!
//! `InMemoryEngine` implements [`EngineFacade`] over a plain map keyed by
//! VFS path. It exists so the runtime and its tests don't depend on a real
//! CRDT collaborator; everything it does is synchronous and cheap, matching
//! the way the teacher's `MockStorage` stands in for a real backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineErrorKind};
use crate::facade::EngineFacade;
use crate::types::{ChangeEvent, ChangeKind, DocumentData, Manifest, RefNode, SerializedState};
use crate::watch::{ChangeReceiver, Subscription, Target, WatchList, WatchReg};

#[derive(Serialize, Deserialize)]
struct BundleFile {
    manifest: Manifest,
    documents: BTreeMap<String, DocumentData>,
}

fn validate_path(path: &str) -> Result<(), EngineError> {
    if !path.starts_with('/') || path.contains("..") {
        return Err(EngineError::invalid_path(path));
    }
    Ok(())
}

fn dir_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{}/", path.trim_end_matches('/'))
    }
}

/// Parse just the manifest out of serialized bundle bytes.
pub(crate) fn manifest_from_bundle(bytes: &[u8]) -> Result<Manifest, EngineError> {
    let bundle: BundleFile = serde_json::from_slice(bytes)
        .map_err(|e| EngineError::new(EngineErrorKind::Other).with_source(e))?;
    Ok(bundle.manifest)
}

/// In-memory reference implementation of [`EngineFacade`].
pub struct InMemoryEngine {
    manifest: RwLock<Manifest>,
    documents: RwLock<BTreeMap<String, DocumentData>>,
    connected: AtomicBool,
    watches: WatchList,
    next_watch_id: AtomicU64,
}

impl InMemoryEngine {
    /// Create a fresh, empty engine with a freshly generated root id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            manifest: RwLock::new(Manifest::new(
                uuid::Uuid::new_v4().to_string(),
                serde_json::Value::Null,
            )),
            documents: RwLock::new(BTreeMap::new()),
            connected: AtomicBool::new(false),
            watches: Arc::new(Mutex::new(Vec::new())),
            next_watch_id: AtomicU64::new(1),
        }
    }

    /// Build an engine by loading a previously serialized bundle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineErrorKind::Other`] if `bytes` is not a well-formed
    /// bundle produced by [`EngineFacade::to_bytes`]/
    /// [`EngineFacade::fork_to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let bundle: BundleFile = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::new(EngineErrorKind::Other).with_source(e))?;
        Ok(Self {
            manifest: RwLock::new(bundle.manifest),
            documents: RwLock::new(bundle.documents),
            connected: AtomicBool::new(true),
            watches: Arc::new(Mutex::new(Vec::new())),
            next_watch_id: AtomicU64::new(1),
        })
    }

    /// Mark the engine connected or disconnected, for exercising the Health
    /// Monitor's reconnect loop against a deterministic backend.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn notify(&self, path: &str, kind: ChangeKind, document: Option<DocumentData>) {
        let mut watches = self.watches.lock().unwrap();
        watches.retain(|w| {
            let matches = match &w.target {
                Target::File(p) => p == path,
                Target::Directory(d) => path == d.as_str() || path.starts_with(&dir_prefix(d)),
            };
            if !matches {
                return true;
            }
            let event = ChangeEvent {
                path: path.to_string(),
                kind,
                document: document.clone(),
            };
            w.tx.send(event).is_ok()
        });
    }

    fn register_watch(&self, target: Target) -> (ChangeReceiver, Subscription) {
        let (tx, rx) = std::sync::mpsc::channel();
        let id = self.next_watch_id.fetch_add(1, Ordering::SeqCst);
        self.watches.lock().unwrap().push(WatchReg { id, target, tx });
        (ChangeReceiver::new(rx), Subscription::new(id, &self.watches))
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFacade for InMemoryEngine {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect_websocket(&self, _url: &str) -> Result<(), EngineError> {
        // The in-process engine has no real socket to dial; whether the
        // attempt "succeeds" is driven by `set_connected` so tests can
        // exercise both outcomes deterministically.
        Ok(())
    }

    fn manifest(&self) -> Result<Manifest, EngineError> {
        if !self.is_connected() {
            return Err(EngineError::new(EngineErrorKind::NotConnected));
        }
        Ok(self.manifest.read().unwrap().clone())
    }

    fn read_file(&self, path: &str) -> Result<DocumentData, EngineError> {
        validate_path(path)?;
        self.documents
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::not_found(path))
    }

    fn create_file(&self, path: &str, content: serde_json::Value) -> Result<(), EngineError> {
        self.create_document(path, DocumentData::text(content))
    }

    fn create_file_with_bytes(
        &self,
        path: &str,
        content: serde_json::Value,
        bytes: &[u8],
    ) -> Result<(), EngineError> {
        use base64::Engine as _;
        let doc = DocumentData {
            content,
            bytes: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        };
        self.create_document(path, doc)
    }

    fn update_file(&self, path: &str, content: serde_json::Value) -> Result<(), EngineError> {
        self.update_document(path, DocumentData::text(content))
    }

    fn update_file_with_bytes(
        &self,
        path: &str,
        content: serde_json::Value,
        bytes: &[u8],
    ) -> Result<(), EngineError> {
        use base64::Engine as _;
        let doc = DocumentData {
            content,
            bytes: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        };
        self.update_document(path, doc)
    }

    fn delete_file(&self, path: &str) -> Result<(), EngineError> {
        validate_path(path)?;
        let removed = self.documents.write().unwrap().remove(path);
        if removed.is_none() {
            return Err(EngineError::not_found(path));
        }
        self.notify(path, ChangeKind::Removed, None);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), EngineError> {
        validate_path(from)?;
        validate_path(to)?;
        let mut documents = self.documents.write().unwrap();
        if documents.contains_key(to) {
            return Err(EngineError::already_exists(to));
        }
        let doc = documents.remove(from).ok_or_else(|| EngineError::not_found(from))?;
        documents.insert(to.to_string(), doc.clone());
        drop(documents);
        self.notify(from, ChangeKind::Removed, None);
        self.notify(to, ChangeKind::Created, Some(doc));
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        if path == "/" {
            return true;
        }
        let documents = self.documents.read().unwrap();
        documents.contains_key(path) || documents.keys().any(|k| k.starts_with(&dir_prefix(path)))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<RefNode>, EngineError> {
        validate_path(path)?;
        if !self.exists(path) {
            return Err(EngineError::not_found(path));
        }
        let prefix = dir_prefix(path);
        let documents = self.documents.read().unwrap();
        let mut seen = std::collections::BTreeMap::new();
        for key in documents.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let mut segments = rest.splitn(2, '/');
            let name = segments.next().unwrap().to_string();
            let is_directory = segments.next().is_some();
            let entry_path = format!("{prefix}{name}");
            seen.entry(name.clone()).or_insert(RefNode {
                name,
                path: entry_path,
                is_directory,
            });
        }
        Ok(seen.into_values().collect())
    }

    fn watch_file(&self, path: &str) -> Result<(ChangeReceiver, Subscription), EngineError> {
        validate_path(path)?;
        Ok(self.register_watch(Target::File(path.to_string())))
    }

    fn watch_directory(&self, path: &str) -> Result<(ChangeReceiver, Subscription), EngineError> {
        validate_path(path)?;
        Ok(self.register_watch(Target::Directory(path.to_string())))
    }

    fn to_bytes(&self) -> Result<SerializedState, EngineError> {
        let manifest = self.manifest.read().unwrap().clone();
        let documents = self.documents.read().unwrap().clone();
        let bundle = BundleFile {
            manifest: manifest.clone(),
            documents,
        };
        let bytes = serde_json::to_vec(&bundle)
            .map_err(|e| EngineError::new(EngineErrorKind::Other).with_source(e))?;
        Ok(SerializedState {
            bytes,
            root_id: manifest.root_id,
        })
    }

    fn fork_to_bytes(&self) -> Result<SerializedState, EngineError> {
        let documents = self.documents.read().unwrap().clone();
        let metadata = self.manifest.read().unwrap().metadata.clone();
        let root_id = uuid::Uuid::new_v4().to_string();
        let bundle = BundleFile {
            manifest: Manifest::new(root_id.clone(), metadata),
            documents,
        };
        let bytes = serde_json::to_vec(&bundle)
            .map_err(|e| EngineError::new(EngineErrorKind::Other).with_source(e))?;
        Ok(SerializedState { bytes, root_id })
    }
}

impl InMemoryEngine {
    fn create_document(&self, path: &str, doc: DocumentData) -> Result<(), EngineError> {
        validate_path(path)?;
        let mut documents = self.documents.write().unwrap();
        if documents.contains_key(path) {
            return Err(EngineError::already_exists(path));
        }
        documents.insert(path.to_string(), doc.clone());
        drop(documents);
        self.notify(path, ChangeKind::Created, Some(doc));
        Ok(())
    }

    fn update_document(&self, path: &str, doc: DocumentData) -> Result<(), EngineError> {
        validate_path(path)?;
        let mut documents = self.documents.write().unwrap();
        if !documents.contains_key(path) {
            return Err(EngineError::not_found(path));
        }
        documents.insert(path.to_string(), doc.clone());
        drop(documents);
        self.notify(path, ChangeKind::Modified, Some(doc));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_read_roundtrips() {
        let engine = InMemoryEngine::new();
        engine
            .create_file("/a.txt", serde_json::json!({"mime": "text/plain"}))
            .unwrap();
        let doc = engine.read_file("/a.txt").unwrap();
        assert_eq!(doc.mime(), Some("text/plain"));
    }

    #[test]
    fn create_twice_conflicts() {
        let engine = InMemoryEngine::new();
        engine.create_file("/a.txt", serde_json::Value::Null).unwrap();
        let err = engine.create_file("/a.txt", serde_json::Value::Null).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::AlreadyExists);
    }

    #[test]
    fn update_missing_is_not_found() {
        let engine = InMemoryEngine::new();
        let err = engine.update_file("/missing.txt", serde_json::Value::Null).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::NotFound);
    }

    #[test]
    fn list_directory_reports_children_and_nested_dirs() {
        let engine = InMemoryEngine::new();
        engine.create_file("/docs/a.txt", serde_json::Value::Null).unwrap();
        engine.create_file("/docs/nested/b.txt", serde_json::Value::Null).unwrap();

        let mut entries = engine.list_directory("/docs").unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert!(!entries[0].is_directory);
        assert_eq!(entries[1].name, "nested");
        assert!(entries[1].is_directory);
    }

    #[test]
    fn list_directory_missing_is_not_found() {
        let engine = InMemoryEngine::new();
        assert_eq!(
            engine.list_directory("/nope").unwrap_err().kind(),
            EngineErrorKind::NotFound
        );
    }

    #[test]
    fn watch_file_sees_only_its_own_path() {
        let engine = InMemoryEngine::new();
        let (rx, _sub) = engine.watch_file("/a.txt").unwrap();
        engine.create_file("/b.txt", serde_json::Value::Null).unwrap();
        engine.create_file("/a.txt", serde_json::Value::Null).unwrap();

        let event = rx.recv().unwrap();
        assert_eq!(event.path, "/a.txt");
        assert_eq!(event.kind, ChangeKind::Created);
    }

    #[test]
    fn watch_directory_sees_nested_changes() {
        let engine = InMemoryEngine::new();
        let (rx, _sub) = engine.watch_directory("/docs").unwrap();
        engine.create_file("/docs/nested/c.txt", serde_json::Value::Null).unwrap();

        let event = rx.recv().unwrap();
        assert_eq!(event.path, "/docs/nested/c.txt");
    }

    #[test]
    fn stopped_watch_stops_receiving() {
        let engine = InMemoryEngine::new();
        let (rx, sub) = engine.watch_file("/a.txt").unwrap();
        sub.stop();
        engine.create_file("/a.txt", serde_json::Value::Null).unwrap();
        assert!(rx.recv().is_none());
    }

    #[test]
    fn to_bytes_then_from_bytes_roundtrips() {
        let engine = InMemoryEngine::new();
        engine.create_file("/a.txt", serde_json::json!({"mime": "text/plain"})).unwrap();
        let state = engine.to_bytes().unwrap();

        let loaded = InMemoryEngine::from_bytes(&state.bytes).unwrap();
        assert!(loaded.is_connected());
        assert_eq!(loaded.manifest().unwrap().root_id, state.root_id);
        assert_eq!(loaded.read_file("/a.txt").unwrap().mime(), Some("text/plain"));
    }

    #[test]
    fn fork_to_bytes_generates_new_root_without_mutating_self() {
        let engine = InMemoryEngine::new();
        let original_root = engine.manifest.read().unwrap().root_id.clone();
        let forked = engine.fork_to_bytes().unwrap();
        assert_ne!(forked.root_id, original_root);
        assert_eq!(engine.manifest.read().unwrap().root_id, original_root);
    }

    #[test]
    fn not_connected_until_loaded() {
        let engine = InMemoryEngine::new();
        assert!(!engine.is_connected());
        assert_eq!(
            engine.manifest().unwrap_err().kind(),
            EngineErrorKind::NotConnected
        );
    }

    #[test]
    fn rejects_path_traversal() {
        let engine = InMemoryEngine::new();
        let err = engine.read_file("/../etc/passwd").unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::InvalidPath);
    }
}
