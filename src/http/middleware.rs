//! Request-id tracking middleware.
//!
//! Honors an incoming `X-Request-ID`, generates one otherwise, propagates
//! it through a task-local for error envelopes, and echoes it on the
//! response.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use log::debug;

use crate::id::generate_id;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Request id of the current request, when inside the middleware scope.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

/// Axum middleware: resolve the request id, scope it, echo it back.
pub async fn request_id(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| generate_id("req"));

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    debug!(
        "REQUEST_START method={} path={} request_id={}",
        method, path, id
    );

    let mut response = REQUEST_ID.scope(id.clone(), next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    debug!(
        "REQUEST_END method={} path={} status={} request_id={}",
        method,
        path,
        response.status(),
        id
    );
    response
}
