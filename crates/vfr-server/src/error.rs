//! HTTP-facing error type.
//!
//! Normal resolver misses never reach here — a miss against the VFS
//! produces a 404 from the fetch handler directly, and a resolver bypass
//! just lets the request fall through. `ServerError` is reserved for the
//! genuinely exceptional cases: a dev-proxy upstream that refuses to
//! answer, or a malformed request the router itself rejects.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub(crate) enum ServerError {
    #[error("dev proxy upstream unreachable: {0}")]
    DevProxyUnreachable(#[from] reqwest::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::DevProxyUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}
