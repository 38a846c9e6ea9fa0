//! The RPC Dispatcher: request/response envelopes, the admission policy,
//! and per-op handlers covering every engine and lifecycle operation.

use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::lifecycle::LifecycleController;
use crate::queue::MessageQueue;
use crate::watch::WatchRegistry;

/// Content payload for `writeFile`, mirroring `DocumentData` minus the
/// runtime-assigned framing.
#[derive(Clone, Debug, Deserialize)]
pub struct WriteContent {
    pub content: serde_json::Value,
    pub bytes: Option<String>,
}

/// Every inbound RPC message, tagged by `type`.
///
/// All path-bearing variants accept an absolute VFS path starting with
/// `/`; validation of that shape is the engine's job, not the envelope's.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RpcRequest {
    SetAppSlug {
        slug: String,
    },
    Init {
        id: String,
        ws_url: String,
        manifest: serde_json::Value,
    },
    ReadFile {
        id: String,
        path: String,
    },
    WriteFile {
        id: String,
        path: String,
        content: WriteContent,
        create: bool,
    },
    DeleteFile {
        id: String,
        path: String,
    },
    Rename {
        id: String,
        old_path: String,
        new_path: String,
    },
    ListDirectory {
        id: String,
        path: String,
    },
    Exists {
        id: String,
        path: String,
    },
    WatchFile {
        id: String,
        path: String,
    },
    UnwatchFile {
        id: String,
    },
    WatchDirectory {
        id: String,
        path: String,
    },
    UnwatchDirectory {
        id: String,
    },
    ToBytes {
        id: String,
    },
    ForkToBytes {
        id: String,
    },
    LoadBundle {
        id: String,
        bundle_bytes: String,
        server_url: Option<String>,
    },
    InitializeFromUrl {
        id: String,
        manifest_url: Option<String>,
        wasm_url: Option<String>,
        ws_url: Option<String>,
    },
    GetServerUrl {
        id: String,
    },
}

impl RpcRequest {
    /// The op name used in `messageQueued{originalType}` and logging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SetAppSlug { .. } => "setAppSlug",
            Self::Init { .. } => "init",
            Self::ReadFile { .. } => "readFile",
            Self::WriteFile { .. } => "writeFile",
            Self::DeleteFile { .. } => "deleteFile",
            Self::Rename { .. } => "rename",
            Self::ListDirectory { .. } => "listDirectory",
            Self::Exists { .. } => "exists",
            Self::WatchFile { .. } => "watchFile",
            Self::UnwatchFile { .. } => "unwatchFile",
            Self::WatchDirectory { .. } => "watchDirectory",
            Self::UnwatchDirectory { .. } => "unwatchDirectory",
            Self::ToBytes { .. } => "toBytes",
            Self::ForkToBytes { .. } => "forkToBytes",
            Self::LoadBundle { .. } => "loadBundle",
            Self::InitializeFromUrl { .. } => "initializeFromUrl",
            Self::GetServerUrl { .. } => "getServerUrl",
        }
    }

    /// Whether this op is serviced immediately even while not `Ready`
    /// (`spec.md` §4.4 admission policy). `setAppSlug` has no id and is
    /// always a side-effect-only broadcast, handled separately.
    #[must_use]
    fn is_admitted_while_not_ready(&self) -> bool {
        matches!(
            self,
            Self::Init { .. }
                | Self::LoadBundle { .. }
                | Self::InitializeFromUrl { .. }
                | Self::GetServerUrl { .. }
                | Self::SetAppSlug { .. }
        )
    }

    /// The correlation id, for every variant except `setAppSlug`.
    #[must_use]
    fn id(&self) -> Option<&str> {
        match self {
            Self::SetAppSlug { .. } => None,
            Self::Init { id, .. }
            | Self::ReadFile { id, .. }
            | Self::WriteFile { id, .. }
            | Self::DeleteFile { id, .. }
            | Self::Rename { id, .. }
            | Self::ListDirectory { id, .. }
            | Self::Exists { id, .. }
            | Self::WatchFile { id, .. }
            | Self::UnwatchFile { id, .. }
            | Self::WatchDirectory { id, .. }
            | Self::UnwatchDirectory { id, .. }
            | Self::ToBytes { id, .. }
            | Self::ForkToBytes { id, .. }
            | Self::LoadBundle { id, .. }
            | Self::InitializeFromUrl { id, .. }
            | Self::GetServerUrl { id, .. } => Some(id),
        }
    }
}

/// A correlated reply to an id-bearing request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The `messageQueued` acknowledgment sent when an op is admitted into the
/// queue instead of handled immediately.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQueuedEnvelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub original_type: String,
    pub queue_position: usize,
}

/// What dispatching a single request produced.
pub enum DispatchOutcome {
    /// A correlated response is ready to send immediately.
    Responded(RpcResponse),
    /// The op was enqueued; send the acknowledgment now, the real response
    /// arrives later when the queue drains.
    Queued(MessageQueuedEnvelope),
    /// No response at all (`setAppSlug`, or a `loadBundle`/
    /// `initializeFromUrl` superseded before it could commit).
    NoResponse,
}

fn ok(id: &str, data: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse {
        kind: "response",
        id: id.to_string(),
        success: true,
        data,
        error: None,
    }
}

fn err(id: &str, error: impl std::fmt::Display) -> RpcResponse {
    RpcResponse {
        kind: "response",
        id: id.to_string(),
        success: false,
        data: None,
        error: Some(error.to_string()),
    }
}

/// Dispatches [`RpcRequest`]s against the Lifecycle Controller, the
/// engine facade it exposes, and the Watch Registry.
pub struct RpcDispatcher {
    lifecycle: Arc<LifecycleController>,
    watches: Arc<WatchRegistry>,
    health: Arc<crate::health::HealthMonitor>,
    events: tokio::sync::broadcast::Sender<crate::events::BroadcastEvent>,
    queue: MessageQueue,
}

impl RpcDispatcher {
    #[must_use]
    pub fn new(
        lifecycle: Arc<LifecycleController>,
        watches: Arc<WatchRegistry>,
        health: Arc<crate::health::HealthMonitor>,
        events: tokio::sync::broadcast::Sender<crate::events::BroadcastEvent>,
    ) -> Self {
        Self {
            lifecycle,
            watches,
            health,
            events,
            queue: MessageQueue::new(),
        }
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Handle one inbound request, applying the admission policy.
    pub async fn dispatch(&self, request: RpcRequest) -> DispatchOutcome {
        if matches!(request, RpcRequest::SetAppSlug { .. }) {
            let RpcRequest::SetAppSlug { slug } = request else {
                unreachable!()
            };
            self.lifecycle.set_app_slug(slug).await;
            return DispatchOutcome::NoResponse;
        }

        if !request.is_admitted_while_not_ready() && !self.lifecycle.is_ready().await {
            let original_type = request.type_name().to_string();
            let id = request.id().unwrap_or_default().to_string();
            let position = self.queue.enqueue(request);
            return DispatchOutcome::Queued(MessageQueuedEnvelope {
                kind: "messageQueued",
                id,
                original_type,
                queue_position: position,
            });
        }

        DispatchOutcome::Responded(self.handle(request).await)
    }

    /// Drain the queue in parallel batches of
    /// [`crate::queue::DRAIN_BATCH_SIZE`], returning every response in
    /// arrival order. Each message's failure produces a correlated error
    /// response; it never aborts the drain (`spec.md` §4.4).
    pub async fn drain_queue(&self) -> Vec<RpcResponse> {
        let batches = self.queue.drain_batches();
        let mut responses = Vec::new();
        for batch in batches {
            let futures = batch.into_iter().map(|queued| self.handle(queued.request));
            let batch_responses = futures::future::join_all(futures).await;
            responses.extend(batch_responses);
        }
        responses
    }

    async fn handle(&self, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::SetAppSlug { .. } => {
                unreachable!("setAppSlug never reaches handle()")
            }
            RpcRequest::Init { id, ws_url, .. } => {
                // Idempotent; if a load is already in flight, wait for it to
                // settle and reply with its actual outcome (`spec.md` §4.4/§5).
                let _ = ws_url;
                match self.lifecycle.await_pending_load().await {
                    Ok(()) => ok(&id, None),
                    Err(e) => err(&id, e),
                }
            }
            RpcRequest::ReadFile { id, path } => match self.with_engine(&id).await {
                Ok(engine) => match engine.read_file(&path) {
                    Ok(doc) => {
                        let data = serde_json::to_value(&doc).unwrap_or(serde_json::Value::Null);
                        ok(&id, Some(data))
                    }
                    Err(e) => err(&id, RuntimeError::from(e)),
                },
                Err(resp) => resp,
            },
            RpcRequest::WriteFile {
                id,
                path,
                content,
                create,
            } => match self.with_engine(&id).await {
                Ok(engine) => {
                    let result = write_document(engine.as_ref(), &path, content, create);
                    match result {
                        Ok(()) => ok(&id, None),
                        Err(e) => err(&id, RuntimeError::from(e)),
                    }
                }
                Err(resp) => resp,
            },
            RpcRequest::DeleteFile { id, path } => match self.with_engine(&id).await {
                Ok(engine) => match engine.delete_file(&path) {
                    Ok(()) => ok(&id, None),
                    Err(e) => err(&id, RuntimeError::from(e)),
                },
                Err(resp) => resp,
            },
            RpcRequest::Rename {
                id,
                old_path,
                new_path,
            } => match self.with_engine(&id).await {
                Ok(engine) => match engine.rename(&old_path, &new_path) {
                    Ok(()) => ok(&id, None),
                    Err(e) => err(&id, RuntimeError::from(e)),
                },
                Err(resp) => resp,
            },
            RpcRequest::ListDirectory { id, path } => match self.with_engine(&id).await {
                Ok(engine) => match engine.list_directory(&path) {
                    Ok(entries) => {
                        let data = serde_json::to_value(&entries).unwrap_or(serde_json::Value::Null);
                        ok(&id, Some(data))
                    }
                    Err(e) => err(&id, RuntimeError::from(e)),
                },
                Err(resp) => resp,
            },
            RpcRequest::Exists { id, path } => match self.with_engine(&id).await {
                Ok(engine) => ok(&id, Some(serde_json::json!(engine.exists(&path)))),
                Err(resp) => resp,
            },
            RpcRequest::WatchFile { id, path } => match self.with_engine(&id).await {
                Ok(engine) => {
                    match self
                        .watches
                        .watch_file(id.clone(), path, engine.as_ref())
                    {
                        Ok(()) => ok(&id, None),
                        Err(e) => err(&id, RuntimeError::from(e)),
                    }
                }
                Err(resp) => resp,
            },
            RpcRequest::UnwatchFile { id } | RpcRequest::UnwatchDirectory { id } => {
                self.watches.unwatch(&id);
                ok(&id, None)
            }
            RpcRequest::WatchDirectory { id, path } => match self.with_engine(&id).await {
                Ok(engine) => {
                    match self
                        .watches
                        .watch_directory(id.clone(), path, engine.as_ref())
                    {
                        Ok(()) => ok(&id, None),
                        Err(e) => err(&id, RuntimeError::from(e)),
                    }
                }
                Err(resp) => resp,
            },
            RpcRequest::ToBytes { id } => match self.with_engine(&id).await {
                Ok(engine) => match engine.to_bytes() {
                    Ok(state) => ok(&id, Some(serialized_state_json(&state))),
                    Err(e) => err(&id, RuntimeError::from(e)),
                },
                Err(resp) => resp,
            },
            RpcRequest::ForkToBytes { id } => match self.with_engine(&id).await {
                Ok(engine) => match engine.fork_to_bytes() {
                    Ok(state) => ok(&id, Some(serialized_state_json(&state))),
                    Err(e) => err(&id, RuntimeError::from(e)),
                },
                Err(resp) => resp,
            },
            RpcRequest::LoadBundle {
                id,
                bundle_bytes,
                server_url,
            } => {
                let bytes = match base64::engine::general_purpose::STANDARD.decode(&bundle_bytes) {
                    Ok(bytes) => bytes,
                    Err(e) => return err(&id, format!("invalid bundleBytes: {e}")),
                };
                match self.lifecycle.load_bundle(bytes, server_url).await {
                    Ok(Some(_)) => {
                        self.health.restart();
                        let _ = self.events.send(crate::events::BroadcastEvent::SwReady);
                        ok(&id, None)
                    }
                    Ok(None) => {
                        // Superseded; spec.md §9(i) — outcome not surfaced.
                        RpcResponse {
                            kind: "response",
                            id,
                            success: true,
                            data: None,
                            error: None,
                        }
                    }
                    Err(e) => err(&id, e),
                }
            }
            RpcRequest::InitializeFromUrl {
                id,
                manifest_url,
                wasm_url,
                ws_url,
            } => match self
                .lifecycle
                .initialize_from_url(manifest_url, wasm_url, ws_url)
                .await
            {
                Ok(Some(_)) => {
                    self.health.restart();
                    let _ = self.events.send(crate::events::BroadcastEvent::SwReady);
                    ok(&id, None)
                }
                Ok(None) => RpcResponse {
                    kind: "response",
                    id,
                    success: true,
                    data: None,
                    error: None,
                },
                Err(e) => err(&id, e),
            },
            RpcRequest::GetServerUrl { id } => {
                let url = self.lifecycle.server_url().await.unwrap_or_default();
                ok(&id, Some(serde_json::json!(url)))
            }
        }
    }

    /// Fetch the live engine, or the admission error response if none is
    /// loaded (`spec.md` §7 Admission error).
    async fn with_engine(&self, id: &str) -> Result<Arc<dyn vfr_engine::EngineFacade>, RpcResponse> {
        match self.lifecycle.engine().await {
            Some(engine) => Ok(engine),
            None => Err(err(id, RuntimeError::NotReady)),
        }
    }
}

fn serialized_state_json(state: &vfr_engine::SerializedState) -> serde_json::Value {
    serde_json::json!({
        "bytes": base64::engine::general_purpose::STANDARD.encode(&state.bytes),
        "rootId": state.root_id,
    })
}

fn write_document(
    engine: &dyn vfr_engine::EngineFacade,
    path: &str,
    content: WriteContent,
    create: bool,
) -> Result<(), vfr_engine::EngineError> {
    match (content.bytes, create) {
        (Some(b64), true) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&b64)
                .map_err(|e| {
                    vfr_engine::EngineError::new(vfr_engine::EngineErrorKind::InvalidPath)
                        .with_path(path)
                        .with_source(e)
                })?;
            engine.create_file_with_bytes(path, content.content, &bytes)
        }
        (Some(b64), false) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&b64)
                .map_err(|e| {
                    vfr_engine::EngineError::new(vfr_engine::EngineErrorKind::InvalidPath)
                        .with_path(path)
                        .with_source(e)
                })?;
            engine.update_file_with_bytes(path, content.content, &bytes)
        }
        (None, true) => engine.create_file(path, content.content),
        (None, false) => engine.update_file(path, content.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthMonitor;
    use crate::lifecycle::HttpBundleFetcher;
    use vfr_cache::NullCache;
    use vfr_engine::InMemoryEngine;

    fn dispatcher_for(lifecycle: &Arc<LifecycleController>) -> RpcDispatcher {
        let (tx, _rx) = tokio::sync::broadcast::channel(16);
        let watches = Arc::new(WatchRegistry::new(tx.clone()));
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(lifecycle),
            Arc::clone(&watches),
            tx.clone(),
            false,
        ));
        RpcDispatcher::new(Arc::clone(lifecycle), watches, health, tx)
    }

    async fn ready_dispatcher() -> (RpcDispatcher, Arc<LifecycleController>) {
        let cache = NullCache;
        let lifecycle = Arc::new(LifecycleController::new(
            &cache,
            Arc::new(HttpBundleFetcher::new()),
        ));
        let engine = InMemoryEngine::new();
        engine
            .create_file("/hello", serde_json::json!({"mime": "text/plain"}))
            .unwrap();
        let bytes = engine.to_bytes().unwrap().bytes;
        lifecycle.load_bundle(bytes, None).await.unwrap();

        let dispatcher = dispatcher_for(&lifecycle);
        (dispatcher, lifecycle)
    }

    #[tokio::test]
    async fn not_ready_queues_read_file() {
        let cache = NullCache;
        let lifecycle = Arc::new(LifecycleController::new(
            &cache,
            Arc::new(HttpBundleFetcher::new()),
        ));
        let dispatcher = dispatcher_for(&lifecycle);

        let outcome = dispatcher
            .dispatch(RpcRequest::ReadFile {
                id: "a".to_string(),
                path: "/x".to_string(),
            })
            .await;
        match outcome {
            DispatchOutcome::Queued(env) => {
                assert_eq!(env.id, "a");
                assert_eq!(env.original_type, "readFile");
                assert_eq!(env.queue_position, 1);
            }
            _ => panic!("expected Queued"),
        }
    }

    #[tokio::test]
    async fn ready_read_file_succeeds() {
        let (dispatcher, _lifecycle) = ready_dispatcher().await;
        let outcome = dispatcher
            .dispatch(RpcRequest::ReadFile {
                id: "a".to_string(),
                path: "/hello".to_string(),
            })
            .await;
        match outcome {
            DispatchOutcome::Responded(resp) => {
                assert!(resp.success);
                assert_eq!(resp.id, "a");
            }
            _ => panic!("expected Responded"),
        }
    }

    #[tokio::test]
    async fn exists_false_for_missing_path() {
        let (dispatcher, _lifecycle) = ready_dispatcher().await;
        let outcome = dispatcher
            .dispatch(RpcRequest::Exists {
                id: "c".to_string(),
                path: "/nope".to_string(),
            })
            .await;
        match outcome {
            DispatchOutcome::Responded(resp) => {
                assert!(resp.success);
                assert_eq!(resp.data, Some(serde_json::json!(false)));
            }
            _ => panic!("expected Responded"),
        }
    }

    #[tokio::test]
    async fn set_app_slug_has_no_response() {
        let cache = NullCache;
        let lifecycle = Arc::new(LifecycleController::new(
            &cache,
            Arc::new(HttpBundleFetcher::new()),
        ));
        let dispatcher = dispatcher_for(&lifecycle);

        let outcome = dispatcher
            .dispatch(RpcRequest::SetAppSlug {
                slug: "docs".to_string(),
            })
            .await;
        assert!(matches!(outcome, DispatchOutcome::NoResponse));
        assert_eq!(lifecycle.scope().await.as_deref(), Some("docs"));
    }

    #[tokio::test]
    async fn queued_ops_drain_in_arrival_order_once_ready() {
        let cache = NullCache;
        let lifecycle = Arc::new(LifecycleController::new(
            &cache,
            Arc::new(HttpBundleFetcher::new()),
        ));
        let dispatcher = dispatcher_for(&lifecycle);

        for i in 0..3 {
            dispatcher
                .dispatch(RpcRequest::Exists {
                    id: i.to_string(),
                    path: "/x".to_string(),
                })
                .await;
        }
        assert_eq!(dispatcher.queue_len(), 3);

        let engine = InMemoryEngine::new();
        let bytes = engine.to_bytes().unwrap().bytes;
        lifecycle.load_bundle(bytes, None).await.unwrap();

        let responses = dispatcher.drain_queue().await;
        assert_eq!(responses.len(), 3);
        for (i, resp) in responses.iter().enumerate() {
            assert_eq!(resp.id, i.to_string());
            assert!(resp.success);
        }
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let (dispatcher, _lifecycle) = ready_dispatcher().await;
        dispatcher
            .dispatch(RpcRequest::WriteFile {
                id: "w".to_string(),
                path: "/new.txt".to_string(),
                content: WriteContent {
                    content: serde_json::json!({"mime": "text/plain"}),
                    bytes: None,
                },
                create: true,
            })
            .await;

        let outcome = dispatcher
            .dispatch(RpcRequest::ReadFile {
                id: "r".to_string(),
                path: "/new.txt".to_string(),
            })
            .await;
        let DispatchOutcome::Responded(resp) = outcome else {
            panic!("expected Responded")
        };
        assert!(resp.success);
    }

    #[tokio::test]
    async fn init_acks_immediately_with_no_load_in_progress() {
        let cache = NullCache;
        let lifecycle = Arc::new(LifecycleController::new(
            &cache,
            Arc::new(HttpBundleFetcher::new()),
        ));
        let dispatcher = dispatcher_for(&lifecycle);

        let outcome = dispatcher
            .dispatch(RpcRequest::Init {
                id: "i".to_string(),
                ws_url: "ws://localhost:3000".to_string(),
                manifest: serde_json::json!({}),
            })
            .await;
        let DispatchOutcome::Responded(resp) = outcome else {
            panic!("expected Responded")
        };
        assert!(resp.success);
    }

    #[tokio::test]
    async fn init_awaits_in_flight_load_and_reports_its_failure() {
        let cache = NullCache;
        let lifecycle = Arc::new(LifecycleController::new(
            &cache,
            Arc::new(HttpBundleFetcher::new()),
        ));
        let dispatcher = dispatcher_for(&lifecycle);

        let loader = Arc::clone(&lifecycle);
        let load = tokio::spawn(async move { loader.load_bundle(b"not a bundle".to_vec(), None).await });
        // Let the spawned load claim the Loading state and hit its own
        // suspension point before init races in.
        tokio::task::yield_now().await;

        let outcome = dispatcher
            .dispatch(RpcRequest::Init {
                id: "i".to_string(),
                ws_url: "ws://localhost:3000".to_string(),
                manifest: serde_json::json!({}),
            })
            .await;
        let DispatchOutcome::Responded(resp) = outcome else {
            panic!("expected Responded")
        };
        assert!(!resp.success, "init must report the pending load's actual failure");
        assert!(load.await.unwrap().is_err());
    }
}
