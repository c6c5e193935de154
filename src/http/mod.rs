//! HTTP transport: router, middleware, error envelope.

pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{build_router, serve};
pub use state::AppState;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{error, warn};
use serde_json::json;

use crate::error::GatewayError;
use crate::http::middleware::current_request_id;

/// Render every taxonomy error as the standard JSON envelope with the
/// request id from the middleware scope.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("{}: {}", self.code(), self);
        } else {
            warn!("{}: {}", self.code(), self);
        }
        let body = json!({
            "error_code": self.code(),
            "error_type": self.type_name(),
            "message": self.to_string(),
            "request_id": current_request_id(),
            "details": self.details(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_envelope_status_codes() {
        let response = GatewayError::SessionNotFound("s".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = GatewayError::LlmTimeout("t".into()).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let response = GatewayError::GuardBlocked {
            score: 1.0,
            threshold: 0.85,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
