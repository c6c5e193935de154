//! Health and model-configuration endpoints.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use serde_json::Value;

use crate::health::collect_health;
use crate::http::state::AppState;

/// GET /health — full health with deep dependency checks.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(
        collect_health(
            &state.sessions,
            &state.settings.llm,
            state.uptime_seconds(),
            true,
        )
        .await,
    )
}

/// GET /health/ready — readiness probe (deep backend ping).
pub async fn ready(State(state): State<AppState>) -> Json<Value> {
    Json(
        collect_health(
            &state.sessions,
            &state.settings.llm,
            state.uptime_seconds(),
            true,
        )
        .await,
    )
}

/// GET /health/live — liveness probe (no external checks).
pub async fn live(State(state): State<AppState>) -> Json<Value> {
    Json(
        collect_health(
            &state.sessions,
            &state.settings.llm,
            state.uptime_seconds(),
            false,
        )
        .await,
    )
}

#[derive(Debug, Serialize)]
pub struct ModelConfigResponse {
    pub model_default: String,
    pub model_hints: String,
    pub model_answer: String,
    pub model_verify: String,
    pub temperature: f64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub http2_enabled: bool,
}

/// GET /health/models — model configuration snapshot.
pub async fn models(State(state): State<AppState>) -> Json<ModelConfigResponse> {
    let llm = &state.settings.llm;
    Json(ModelConfigResponse {
        model_default: llm.default_model.clone(),
        model_hints: llm.model_for(Some("hints")).to_string(),
        model_answer: llm.model_for(Some("answer")).to_string(),
        model_verify: llm.model_for(Some("verify")).to_string(),
        temperature: llm.temperature,
        timeout_seconds: llm.timeout_secs,
        max_retries: llm.max_retries,
        http2_enabled: state.settings.http.http2_enabled,
    })
}
