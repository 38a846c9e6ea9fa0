//! File-based cache implementation.
//!
//! Each entry is stored as a pair of sidecar files under
//! `<root>/v1/<bucket>/`: a `.meta.json` file carrying the etag and a
//! `.bin` file carrying the raw value. The `v1` path segment lets a future
//! incompatible on-disk format coexist with (or replace) this one without
//! colliding.
//!
//! All writes are best-effort: a failure to create a directory or write a
//! file is logged and swallowed rather than propagated, since the cache is
//! always an optimization over the authoritative engine state, never the
//! source of truth.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Cache, CacheBucket};

#[derive(Serialize, Deserialize)]
struct EntryMeta {
    etag: String,
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File-based cache rooted at a directory.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Create a cache rooted at `root`. The directory is created lazily on
    /// first write; a missing root is not an error until then.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileCacheBucket {
            dir: self.root.join("v1").join(sanitize_key(name)),
        })
    }
}

struct FileCacheBucket {
    dir: PathBuf,
}

impl FileCacheBucket {
    fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let safe = sanitize_key(key);
        (
            self.dir.join(format!("{safe}.meta.json")),
            self.dir.join(format!("{safe}.bin")),
        )
    }

    fn remove_paths(meta_path: &Path, data_path: &Path) {
        let _ = std::fs::remove_file(meta_path);
        let _ = std::fs::remove_file(data_path);
    }
}

impl CacheBucket for FileCacheBucket {
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>> {
        let (meta_path, data_path) = self.paths(key);
        let meta_bytes = std::fs::read(&meta_path).ok()?;
        let meta: EntryMeta = serde_json::from_slice(&meta_bytes).ok()?;
        if !etag.is_empty() && meta.etag != etag {
            return None;
        }
        std::fs::read(&data_path).ok()
    }

    fn set(&self, key: &str, etag: &str, value: &[u8]) {
        if let Err(error) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), %error, "failed to create cache directory");
            return;
        }
        let (meta_path, data_path) = self.paths(key);
        let meta = EntryMeta {
            etag: etag.to_string(),
        };
        let meta_bytes = match serde_json::to_vec(&meta) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(%key, %error, "failed to serialize cache metadata");
                return;
            }
        };
        if let Err(error) = std::fs::write(&meta_path, &meta_bytes) {
            tracing::warn!(%key, %error, "failed to write cache metadata");
            return;
        }
        if let Err(error) = std::fs::write(&data_path, value) {
            tracing::warn!(%key, %error, "failed to write cache value");
            let _ = std::fs::remove_file(&meta_path);
        }
    }

    fn remove(&self, key: &str) {
        let (meta_path, data_path) = self.paths(key);
        Self::remove_paths(&meta_path, &data_path);
    }
}
