//! Runtime error taxonomy.

use vfr_engine::EngineError;

/// Error returned by [`crate::lifecycle::LifecycleController`] and
/// [`crate::rpc`] operations.
///
/// Collapsed to a stringified `{success:false, error}` shape at the RPC
/// boundary; no variant beyond `Display` leaks across it.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Operation attempted while the runtime is not `Ready` and the
    /// operation is not on the admission allow-list.
    #[error("VFS not initialized, message queued")]
    NotReady,

    /// Failure reading, writing, or watching the document tree.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Failure reading or writing the persistent state cache.
    ///
    /// `vfr-cache` writes are best-effort and never return a typed error,
    /// so this variant carries a description rather than wrapping one.
    #[error("cache error: {0}")]
    Cache(String),

    /// Failure fetching a bundle, manifest, or wasm asset from a URL.
    #[error("fetch error: {0}")]
    Fetch(String),
}
