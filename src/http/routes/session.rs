//! Session endpoints.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{GatewayError, Result};
use crate::guard::ensure_safe;
use crate::http::routes::llm::ChatResponse;
use crate::http::state::AppState;
use crate::id::{generate_id, resolve_session_id};
use crate::llm::MessageRole;

#[derive(Debug, Deserialize)]
pub struct SessionCreateRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionCreateResponse {
    pub session_id: String,
    pub model: String,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionChatRequest {
    pub prompt: String,
}

/// POST /api/sessions — create a fresh session.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<SessionCreateRequest>,
) -> Result<Json<SessionCreateResponse>> {
    let model = request
        .model
        .unwrap_or_else(|| state.settings.llm.default_model.clone());
    let session_id = resolve_session_id(
        request.session_id.as_deref(),
        request.chat_id.as_deref(),
        request.namespace.as_deref(),
        "generic",
    )
    .unwrap_or_else(|| generate_id("sess"));

    let record = state
        .sessions
        .create_fresh_session(&session_id, &model, request.system_prompt.as_deref(), None)
        .await?;

    Ok(Json(SessionCreateResponse {
        session_id: record.session_id,
        model: record.model,
        created: true,
    }))
}

/// GET /api/sessions/{id} — session metadata.
pub async fn info(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>> {
    let record = state
        .sessions
        .get_session(&session_id)
        .await?
        .ok_or_else(|| GatewayError::SessionNotFound(session_id.clone()))?;
    Ok(Json(json!({
        "session_id": record.session_id,
        "model": record.model,
        "created_at": record.created_at.to_rfc3339(),
        "last_accessed": record.last_accessed.to_rfc3339(),
    })))
}

/// DELETE /api/sessions/{id} — end a session.
pub async fn end(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    let removed = state.sessions.end_session(&session_id).await;
    Json(json!({"session_id": session_id, "removed": removed}))
}

/// POST /api/sessions/{id}/messages — session-scoped chat.
pub async fn chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SessionChatRequest>,
) -> Result<Json<ChatResponse>> {
    ensure_safe(&state.guard, &request.prompt).await?;

    let record = state
        .sessions
        .get_session(&session_id)
        .await?
        .ok_or_else(|| GatewayError::SessionNotFound(session_id.clone()))?;

    state
        .sessions
        .add_message(&session_id, MessageRole::User, &request.prompt)
        .await?;

    // Prior history only: drop the message we just appended, then trim to
    // the configured pair budget.
    let mut history = state.sessions.get_history_as_dicts(&session_id).await?;
    history.pop();
    let max_pairs = state.settings.session.history_max_pairs;
    if max_pairs == 0 {
        history.clear();
    } else {
        let max_messages = max_pairs * 2;
        if history.len() > max_messages {
            history = history.split_off(history.len() - max_messages);
        }
    }

    let response = state
        .llm
        .chat(
            &request.prompt,
            record.system_prompt.as_deref(),
            &history,
            Some(&record.model),
        )
        .await?;

    state
        .sessions
        .add_message(&session_id, MessageRole::Assistant, &response)
        .await?;

    Ok(Json(ChatResponse {
        response,
        model: record.model,
    }))
}
