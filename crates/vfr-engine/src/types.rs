//! Value types exchanged with the engine facade.

use serde::{Deserialize, Serialize};

/// Content and (optional) binary payload for a single file read.
///
/// `content` is never interpreted by the runtime beyond reading
/// `content["mime"]` when present; `bytes`, when present, is the base64
/// text of the file's raw octets exactly as it crosses the RPC boundary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    /// Opaque metadata describing the document (e.g. `{"mime": "text/plain"}`).
    pub content: serde_json::Value,
    /// Base64-encoded raw bytes, present for binary files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
}

impl DocumentData {
    /// Build a document from a MIME type and raw bytes.
    #[must_use]
    pub fn with_bytes(mime: impl Into<String>, bytes: &[u8]) -> Self {
        use base64::Engine as _;
        Self {
            content: serde_json::json!({ "mime": mime.into() }),
            bytes: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }

    /// Build a text-only document (no `bytes` field).
    #[must_use]
    pub fn text(content: serde_json::Value) -> Self {
        Self {
            content,
            bytes: None,
        }
    }

    /// MIME type declared in `content.mime`, if any.
    #[must_use]
    pub fn mime(&self) -> Option<&str> {
        self.content.get("mime").and_then(serde_json::Value::as_str)
    }

    /// Decode `bytes` from base64, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is present but not valid base64.
    pub fn decoded_bytes(&self) -> Result<Option<Vec<u8>>, base64::DecodeError> {
        use base64::Engine as _;
        self.bytes
            .as_deref()
            .map(|b| base64::engine::general_purpose::STANDARD.decode(b))
            .transpose()
    }
}

/// A single entry returned by `list_directory`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefNode {
    /// Entry name (final path segment).
    pub name: String,
    /// Full absolute path within the VFS.
    pub path: String,
    /// Whether this entry is itself a directory.
    pub is_directory: bool,
}

/// Descriptor produced when a bundle is loaded; immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// CRDT root handle for the document tree this manifest describes.
    pub root_id: String,
    /// Arbitrary bundle metadata (producer-defined, opaque to the runtime).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Manifest {
    /// Create a manifest with a freshly generated root id.
    #[must_use]
    pub fn new(root_id: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            root_id: root_id.into(),
            metadata,
        }
    }
}

/// The result of serializing engine state: raw bytes plus the root id they
/// resolve to (per `toBytes`/`forkToBytes` in the RPC surface).
#[derive(Clone, Debug)]
pub struct SerializedState {
    /// Serialized byte sequence (opaque to callers).
    pub bytes: Vec<u8>,
    /// Root id of the document tree the bytes describe.
    pub root_id: String,
}

/// Kind of change delivered by a watch subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// A file or directory entry was created.
    Created,
    /// A file's content changed.
    Modified,
    /// A file or directory entry was removed.
    Removed,
}

/// A single change notification delivered to a watcher.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    /// Path the change occurred at.
    pub path: String,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Document data at the time of the event, for file watches.
    pub document: Option<DocumentData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_data_with_bytes_roundtrips() {
        let doc = DocumentData::with_bytes("text/plain", b"hi");
        assert_eq!(doc.mime(), Some("text/plain"));
        assert_eq!(doc.bytes.as_deref(), Some("aGk="));
        assert_eq!(doc.decoded_bytes().unwrap(), Some(b"hi".to_vec()));
    }

    #[test]
    fn document_data_text_has_no_bytes() {
        let doc = DocumentData::text(serde_json::json!({"mime": "application/json"}));
        assert!(doc.bytes.is_none());
        assert_eq!(doc.decoded_bytes().unwrap(), None);
    }
}
