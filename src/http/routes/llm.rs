//! Core LLM endpoints: chat, streaming, structured output, usage.

use std::convert::Infallible;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::guard::ensure_safe;
use crate::http::state::AppState;
use crate::llm::{EventStream, HistoryEntry, StreamEvent, TaskKind};
use crate::usage::MetricsSnapshot;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct StructuredRequest {
    pub prompt: String,
    pub json_schema: Value,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatWithUsageResponse {
    pub text: String,
    pub usage: crate::llm::UsageInfo,
    pub reasoning: String,
    pub has_reasoning: bool,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub reasoning_tokens: Option<i64>,
    pub model: Option<String>,
}

fn task_from(request: &Option<String>) -> Option<TaskKind> {
    request.as_deref().and_then(TaskKind::from_name)
}

fn history_from(request: &Option<Vec<HistoryEntry>>) -> Vec<HistoryEntry> {
    request.clone().unwrap_or_default()
}

/// Restrict structured schemas to objects whose properties are primitives,
/// primitive arrays, or plain objects.
pub fn validate_structured_schema(schema: &Value) -> Result<()> {
    let invalid = |field: &str, message: &str| GatewayError::InvalidInput {
        field: field.to_string(),
        message: message.to_string(),
    };

    match schema.get("type") {
        None => {}
        Some(Value::String(kind)) if kind == "object" => {}
        Some(_) => return Err(invalid("json_schema", "only object schemas are supported")),
    }

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("json_schema", "properties must be an object"))?;
    if properties.is_empty() {
        return Err(invalid("json_schema", "at least one property is required"));
    }

    const PRIMITIVES: &[&str] = &["string", "integer", "number", "boolean"];

    for (name, prop) in properties {
        let prop = prop
            .as_object()
            .ok_or_else(|| invalid(name, "property definition must be an object"))?;

        let type_value = prop
            .get("type")
            .ok_or_else(|| invalid(name, "type is required"))?;
        let prop_type = match type_value {
            Value::String(s) => s.clone(),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .map(str::to_string)
                .ok_or_else(|| invalid(name, "type is required"))?,
            _ => return Err(invalid(name, "type must be string or list")),
        };

        match prop_type.as_str() {
            "array" => {
                let item_type = prop
                    .get("items")
                    .and_then(|items| items.get("type"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(name, "items.type is required"))?;
                if !PRIMITIVES.contains(&item_type) && item_type != "object" {
                    return Err(invalid(
                        name,
                        "array items.type must be one of string|integer|number|boolean|object",
                    ));
                }
            }
            "object" => {}
            other if PRIMITIVES.contains(&other) => {}
            other => {
                return Err(invalid(name, &format!("unsupported type '{}'", other)));
            }
        }
    }

    Ok(())
}

/// POST /api/llm/chat — stateless completion.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    ensure_safe(&state.guard, &request.prompt).await?;
    let history = history_from(&request.history);
    let response = state
        .llm
        .chat(
            &request.prompt,
            request.system_prompt.as_deref(),
            &history,
            request.model.as_deref(),
        )
        .await?;
    Ok(Json(ChatResponse {
        response,
        model: request
            .model
            .unwrap_or_else(|| state.settings.llm.default_model.clone()),
    }))
}

fn text_stream_body(events: EventStream) -> Body {
    let stream = futures::stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        loop {
            match events.recv().await {
                Some(StreamEvent::Token { content }) => {
                    return Some((Ok::<Bytes, Infallible>(Bytes::from(content)), Some(events)));
                }
                Some(event) if event.is_terminal() => return None,
                Some(_) => continue,
                None => return None,
            }
        }
    });
    Body::from_stream(stream)
}

fn ndjson_body(events: EventStream) -> Body {
    let stream = futures::stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        let event = events.recv().await?;
        let mut line = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        let next = if event.is_terminal() { None } else { Some(events) };
        Some((Ok::<Bytes, Infallible>(Bytes::from(line)), next))
    });
    Body::from_stream(stream)
}

/// POST /api/llm/stream — streaming completion (plain text chunks).
pub async fn stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    ensure_safe(&state.guard, &request.prompt).await?;
    let history = history_from(&request.history);
    let events = state
        .llm
        .stream(
            &request.prompt,
            request.system_prompt.as_deref(),
            &history,
            request.model.as_deref(),
        )
        .await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text_stream_body(events),
    )
        .into_response())
}

/// POST /api/llm/stream-events — newline-delimited JSON event stream.
pub async fn stream_events(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    ensure_safe(&state.guard, &request.prompt).await?;
    let history = history_from(&request.history);
    let events = state
        .llm
        .stream_events(
            &request.prompt,
            request.system_prompt.as_deref(),
            &history,
            request.model.as_deref(),
            task_from(&request.task),
        )
        .await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        ndjson_body(events),
    )
        .into_response())
}

/// POST /api/llm/chat-with-usage — completion with usage and reasoning.
pub async fn chat_with_usage(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatWithUsageResponse>> {
    ensure_safe(&state.guard, &request.prompt).await?;
    let history = history_from(&request.history);
    let result = state
        .llm
        .chat_with_usage(
            &request.prompt,
            request.system_prompt.as_deref(),
            &history,
            request.model.as_deref(),
            task_from(&request.task),
        )
        .await?;
    Ok(Json(ChatWithUsageResponse {
        has_reasoning: result.has_reasoning(),
        text: result.text,
        usage: result.usage,
        reasoning: result.reasoning,
    }))
}

/// POST /api/llm/structured — schema-directed completion.
pub async fn structured(
    State(state): State<AppState>,
    Json(request): Json<StructuredRequest>,
) -> Result<Json<Value>> {
    validate_structured_schema(&request.json_schema)?;
    ensure_safe(&state.guard, &request.prompt).await?;
    let history = history_from(&request.history);
    let value = state
        .llm
        .chat_structured(
            &request.prompt,
            &request.json_schema,
            request.system_prompt.as_deref(),
            &history,
            request.model.as_deref(),
        )
        .await?;
    Ok(Json(value))
}

fn snapshot_response(snapshot: MetricsSnapshot, model: String) -> UsageResponse {
    UsageResponse {
        input_tokens: snapshot.total_input_tokens as i64,
        output_tokens: snapshot.total_output_tokens as i64,
        total_tokens: snapshot.total_tokens as i64,
        reasoning_tokens: Some(snapshot.total_reasoning_tokens as i64),
        model: Some(model),
    }
}

/// GET /api/llm/usage — in-memory metrics since process start.
pub async fn usage(State(state): State<AppState>) -> Json<UsageResponse> {
    Json(snapshot_response(
        state.metrics.snapshot(),
        state.settings.llm.default_model.clone(),
    ))
}

/// GET /api/llm/usage/total — cumulative usage from the shared table.
pub async fn usage_total(State(state): State<AppState>) -> Result<Json<UsageResponse>> {
    let total = state.usage.get_total_usage(30).await?;
    Ok(Json(UsageResponse {
        input_tokens: total.input_tokens,
        output_tokens: total.output_tokens,
        total_tokens: total.total_tokens(),
        reasoning_tokens: Some(total.reasoning_tokens),
        model: Some(state.settings.llm.default_model.clone()),
    }))
}

/// GET /api/llm/metrics — raw metrics snapshot.
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_accepts_primitives_and_arrays() {
        let schema = json!({
            "type": "object",
            "properties": {
                "answer": {"type": "string"},
                "count": {"type": "integer"},
                "score": {"type": "number"},
                "ok": {"type": "boolean"},
                "hints": {"type": "array", "items": {"type": "string"}},
                "extra": {"type": "object"}
            }
        });
        assert!(validate_structured_schema(&schema).is_ok());
    }

    #[test]
    fn test_schema_accepts_nullable_types() {
        let schema = json!({
            "properties": {"answer": {"type": ["string", "null"]}}
        });
        assert!(validate_structured_schema(&schema).is_ok());
    }

    #[test]
    fn test_schema_rejects_non_object_root() {
        let schema = json!({"type": "array", "items": {"type": "string"}});
        assert!(validate_structured_schema(&schema).is_err());
    }

    #[test]
    fn test_schema_rejects_empty_properties() {
        assert!(validate_structured_schema(&json!({"properties": {}})).is_err());
        assert!(validate_structured_schema(&json!({})).is_err());
    }

    #[test]
    fn test_schema_rejects_unsupported_types() {
        let schema = json!({"properties": {"blob": {"type": "binary"}}});
        assert!(validate_structured_schema(&schema).is_err());

        let nested_array = json!({
            "properties": {"grid": {"type": "array", "items": {"type": "array"}}}
        });
        assert!(validate_structured_schema(&nested_array).is_err());
    }

    #[test]
    fn test_schema_rejects_missing_item_type() {
        let schema = json!({"properties": {"xs": {"type": "array"}}});
        assert!(validate_structured_schema(&schema).is_err());
    }

    #[test]
    fn test_task_parsing() {
        assert_eq!(task_from(&Some("answer".to_string())), Some(TaskKind::Answer));
        assert_eq!(task_from(&Some("unknown".to_string())), None);
        assert_eq!(task_from(&None), None);
    }
}
