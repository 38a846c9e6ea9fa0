//! Runtime orchestration for the virtual filesystem server: lifecycle
//! state, RPC dispatch, watch bookkeeping, health monitoring, and the
//! request-resolution/response-assembly helpers `vfr-server` builds its
//! HTTP surface on.

mod error;
mod events;
mod health;
mod lifecycle;
mod queue;
mod resolver;
mod response;
mod rpc;
mod runtime;
mod watch;

pub use error::RuntimeError;
pub use events::BroadcastEvent;
pub use health::HealthMonitor;
pub use lifecycle::{BundleFetcher, HttpBundleFetcher, LifecycleController, RuntimeState};
pub use queue::{MessageQueue, QueuedMessage, DRAIN_BATCH_SIZE};
pub use resolver::{
    looks_like_html_route, resolve, spa_fallback_path, Decision, DevProxyConfig, RequestContext,
    Resolution,
};
pub use response::{assemble, mime_for_path, AssembledResponse, Body};
pub use rpc::{
    DispatchOutcome, MessageQueuedEnvelope, RpcDispatcher, RpcRequest, RpcResponse, WriteContent,
};
pub use runtime::Runtime;
pub use watch::WatchRegistry;
