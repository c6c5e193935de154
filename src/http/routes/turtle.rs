//! Turtle-soup endpoints.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use crate::error::Result;
use crate::games::turtle_soup::{
    HintResponse, RevealResponse, TurtleAnswerResponse, ValidationResponse,
};
use crate::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    pub scenario: String,
    pub solution: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HintRequest {
    pub scenario: String,
    pub solution: String,
    #[serde(default = "default_hint_level")]
    pub level: u32,
}

fn default_hint_level() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub solution: String,
    pub player_answer: String,
}

#[derive(Debug, Deserialize)]
pub struct RevealRequest {
    pub scenario: String,
    pub solution: String,
}

/// POST /api/turtle-soup/answers
pub async fn answer(
    State(state): State<AppState>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<TurtleAnswerResponse>> {
    let response = state
        .turtle
        .answer(
            &request.question,
            &request.scenario,
            &request.solution,
            request.session_id.as_deref(),
            request.chat_id.as_deref(),
            request.namespace.as_deref(),
        )
        .await?;
    Ok(Json(response))
}

/// POST /api/turtle-soup/hints
pub async fn hint(
    State(state): State<AppState>,
    Json(request): Json<HintRequest>,
) -> Result<Json<HintResponse>> {
    let response = state
        .turtle
        .hint(&request.scenario, &request.solution, request.level)
        .await?;
    Ok(Json(response))
}

/// POST /api/turtle-soup/validations
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidationResponse>> {
    let response = state
        .turtle
        .validate(&request.solution, &request.player_answer)
        .await?;
    Ok(Json(response))
}

/// POST /api/turtle-soup/reveals
pub async fn reveal(
    State(state): State<AppState>,
    Json(request): Json<RevealRequest>,
) -> Result<Json<RevealResponse>> {
    let response = state
        .turtle
        .reveal(&request.scenario, &request.solution)
        .await?;
    Ok(Json(response))
}
