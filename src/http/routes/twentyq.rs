//! Twenty-questions endpoints.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::games::twentyq::{
    AnswerResponse, HintsResponse, NormalizeResponse, SynonymResponse, VerifyResponse,
};
use crate::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HintsRequest {
    pub target: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    pub target: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub target: String,
    pub guess: String,
}

#[derive(Debug, Deserialize)]
pub struct NormalizeRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct SynonymRequest {
    pub target: String,
    pub guess: String,
}

/// POST /api/twentyq/hints
pub async fn hints(
    State(state): State<AppState>,
    Json(request): Json<HintsRequest>,
) -> Result<Json<HintsResponse>> {
    let response = state
        .twentyq
        .hints(
            &request.target,
            request.category.as_deref(),
            request.details.as_ref(),
        )
        .await?;
    Ok(Json(response))
}

/// POST /api/twentyq/answers
pub async fn answer(
    State(state): State<AppState>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>> {
    let response = state
        .twentyq
        .answer(
            &request.question,
            &request.target,
            request.category.as_deref(),
            request.details.as_ref(),
            request.session_id.as_deref(),
            request.chat_id.as_deref(),
            request.namespace.as_deref(),
        )
        .await?;
    Ok(Json(response))
}

/// POST /api/twentyq/verifications
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let response = state.twentyq.verify(&request.target, &request.guess).await?;
    Ok(Json(response))
}

/// POST /api/twentyq/normalizations
pub async fn normalize(
    State(state): State<AppState>,
    Json(request): Json<NormalizeRequest>,
) -> Result<Json<NormalizeResponse>> {
    let response = state.twentyq.normalize(&request.question).await?;
    Ok(Json(response))
}

/// POST /api/twentyq/synonym-checks
pub async fn synonym_check(
    State(state): State<AppState>,
    Json(request): Json<SynonymRequest>,
) -> Result<Json<SynonymResponse>> {
    let response = state
        .twentyq
        .synonym_check(&request.target, &request.guess)
        .await?;
    Ok(Json(response))
}
