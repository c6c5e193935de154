//! Injection guard endpoints.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GuardRequest {
    pub input_text: String,
}

#[derive(Debug, Serialize)]
pub struct GuardResponse {
    pub score: f64,
    pub malicious: bool,
    pub threshold: f64,
    pub hits: Vec<Value>,
}

/// POST /api/guard/evaluations — full evaluation.
pub async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<GuardRequest>,
) -> Json<GuardResponse> {
    let evaluation = state.guard.evaluate(&request.input_text).await;
    Json(GuardResponse {
        score: evaluation.score,
        malicious: evaluation.malicious(),
        threshold: evaluation.threshold,
        hits: evaluation
            .hits
            .iter()
            .map(|hit| json!({"id": hit.id, "weight": hit.weight}))
            .collect(),
    })
}

/// POST /api/guard/checks — boolean verdict only.
pub async fn check(
    State(state): State<AppState>,
    Json(request): Json<GuardRequest>,
) -> Json<Value> {
    let malicious = state.guard.is_malicious(&request.input_text).await;
    Json(json!({"malicious": malicious}))
}
