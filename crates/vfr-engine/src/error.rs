//! Engine error types.
//!
//! Mirrors the semantic-kind/backend/source shape used across the storage
//! layer so that callers can match on [`EngineErrorKind`] without depending
//! on a specific engine implementation.

use std::path::{Path, PathBuf};

/// Semantic error categories for engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineErrorKind {
    /// Path does not exist in the document tree.
    NotFound,
    /// Path already exists (for create operations with `create: false` semantics).
    AlreadyExists,
    /// Path is malformed (must be absolute, must not contain `..`, etc).
    InvalidPath,
    /// The engine has no live connection (e.g. `connect_websocket` was never
    /// called or the bundle has not finished its first sync).
    NotConnected,
    /// Backend-level failure (bundle parse error, serialization failure).
    Other,
}

/// Error returned by [`crate::EngineFacade`] operations.
#[derive(Debug)]
pub struct EngineError {
    kind: EngineErrorKind,
    path: Option<PathBuf>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    /// Create a new error of the given kind.
    #[must_use]
    pub fn new(kind: EngineErrorKind) -> Self {
        Self {
            kind,
            path: None,
            source: None,
        }
    }

    /// Attach path context.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind for matching.
    #[must_use]
    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }

    /// Get the path if available.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create a not-found error with path.
    #[must_use]
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::new(EngineErrorKind::NotFound).with_path(path)
    }

    /// Create an already-exists error with path.
    #[must_use]
    pub fn already_exists(path: impl Into<PathBuf>) -> Self {
        Self::new(EngineErrorKind::AlreadyExists).with_path(path)
    }

    /// Create an invalid-path error with path.
    #[must_use]
    pub fn invalid_path(path: impl Into<PathBuf>) -> Self {
        Self::new(EngineErrorKind::InvalidPath).with_path(path)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind_str = match self.kind {
            EngineErrorKind::NotFound => "not found",
            EngineErrorKind::AlreadyExists => "already exists",
            EngineErrorKind::InvalidPath => "invalid path",
            EngineErrorKind::NotConnected => "engine not connected",
            EngineErrorKind::Other => "engine error",
        };
        write!(f, "{kind_str}")?;
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_path() {
        let err = EngineError::not_found("/guide.md");
        assert_eq!(err.kind(), EngineErrorKind::NotFound);
        assert_eq!(err.path(), Some(Path::new("/guide.md")));
        assert_eq!(err.to_string(), "not found (path: /guide.md)");
    }

    #[test]
    fn display_without_path() {
        let err = EngineError::new(EngineErrorKind::NotConnected);
        assert_eq!(err.to_string(), "engine not connected");
    }

    #[test]
    fn is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
    }
}
