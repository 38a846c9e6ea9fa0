//! The HTTP fetch path: resolves a request against the Request Resolver,
//! reads the result from the engine, and replies via the Response
//! Assembler. Analogous to `rw-server/src/static_files.rs::serve_asset`,
//! but resolving against the CRDT engine facade instead of embedded or
//! filesystem assets.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use vfr_runtime::{self as runtime, Decision, DevProxyConfig, RequestContext};

use crate::error::ServerError;
use crate::state::AppState;

/// Router fallback: every request that doesn't match `/rpc` lands here.
pub(crate) async fn serve(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Result<Response, ServerError> {
    let path = req.uri().path().to_owned();
    let query = req.uri().query().unwrap_or("").to_owned();
    let headers = req.headers().clone();

    let ctx = RequestContext {
        path: &path,
        query: &query,
        is_websocket_upgrade: is_websocket_upgrade(&headers),
        same_origin: is_same_origin(&headers),
        registration_scope: &state.registration_scope,
    };

    let scope = state.runtime.lifecycle.scope().await;
    let dev_proxy = state
        .dev_proxy_upstream
        .as_deref()
        .map(|upstream_base| DevProxyConfig {
            upstream_base,
            tool_prefixes: &[],
        });

    let resolution = runtime::resolve(&ctx, scope.as_deref(), dev_proxy.as_ref());

    if resolution.clear_scope {
        state.runtime.lifecycle.reset_scope().await;
    }

    match resolution.decision {
        Decision::Bypass => bypass(&state, &path, &query).await,
        Decision::Proxy { upstream_base } => proxy(&state, &upstream_base, &path, &query).await,
        Decision::Vfs { path: vfs_path } => serve_vfs(&state, &vfs_path, &path, &query, scope.as_deref()).await,
    }
}

/// Let a request fall through to the network (`spec.md` §4.2/§7: bypass
/// means passthrough, never a 404 to the page). In this backend-only
/// translation the "network" is the configured dev-proxy upstream; with
/// none configured there is nothing left to fall through to.
async fn bypass(state: &AppState, path: &str, query: &str) -> Result<Response, ServerError> {
    match state.dev_proxy_upstream.as_deref() {
        Some(upstream_base) => proxy(state, upstream_base, path, query).await,
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Same-origin check: an absent `Origin` header means a normal same-origin
/// navigation (browsers only send `Origin` cross-origin or on non-GET
/// requests), so absence is treated as same-origin.
fn is_same_origin(headers: &HeaderMap) -> bool {
    let (Some(origin), Some(host)) = (
        headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()),
        headers.get(header::HOST).and_then(|v| v.to_str().ok()),
    ) else {
        return true;
    };
    origin
        .rsplit('/')
        .next()
        .is_some_and(|origin_host| origin_host == host)
}

async fn serve_vfs(
    state: &AppState,
    vfs_path: &str,
    original_path: &str,
    query: &str,
    scope: Option<&str>,
) -> Result<Response, ServerError> {
    let Some(engine) = state.runtime.lifecycle.engine().await else {
        return bypass(state, original_path, query).await;
    };

    match engine.read_file(vfs_path) {
        Ok(doc) => match runtime::assemble(&doc, vfs_path) {
            Ok(assembled) => Ok(respond(assembled)),
            Err(_) => Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        },
        Err(_) if runtime::looks_like_html_route(original_path) => {
            let Some(scope) = scope else {
                return bypass(state, original_path, query).await;
            };
            let fallback_path = runtime::spa_fallback_path(scope);
            match engine.read_file(&fallback_path) {
                Ok(doc) => match runtime::assemble(&doc, &fallback_path) {
                    Ok(assembled) => Ok(respond(assembled)),
                    Err(_) => Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response()),
                },
                Err(_) => bypass(state, original_path, query).await,
            }
        }
        Err(_) => bypass(state, original_path, query).await,
    }
}

fn respond(assembled: runtime::AssembledResponse) -> Response {
    let body = match assembled.body {
        runtime::Body::Bytes(bytes) => Body::from(bytes),
        runtime::Body::Json(value) => Body::from(serde_json::to_vec(&value).unwrap_or_default()),
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, assembled.content_type)
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Forward the request to the dev-proxy upstream, overlaying the
/// no-cache headers `spec.md` §4.4 mandates for dev-proxy responses.
async fn proxy(
    state: &AppState,
    upstream_base: &str,
    path: &str,
    query: &str,
) -> Result<Response, ServerError> {
    let mut url = format!("{upstream_base}{path}");
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }

    let upstream = state.http_client.get(&url).send().await?;
    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("application/octet-stream"));
    let bytes = upstream.bytes().await?;

    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response()))
}
