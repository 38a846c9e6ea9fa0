//! Liveness endpoint for container orchestration. Not part of the RPC
//! surface; reports `RuntimeState::tag()` as JSON.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

pub(crate) async fn serve(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = state.runtime.lifecycle.tag().await;
    Json(json!({ "status": status }))
}
