//! Gemini REST transport.
//!
//! One `GeminiModel` wraps a single (model, thinking-config) combination.
//! The transport speaks `generateContent` for unary calls and
//! `streamGenerateContent?alt=sse` for streaming, translates provider
//! failures into the gateway taxonomy, and never leaks provider error
//! shapes upward.

use std::time::Duration;

use futures::StreamExt;
use log::{debug, warn};
use reqwest_eventsource::{Event, EventSource};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::{GatewayError, Result};
use crate::llm::streaming::StreamEvent;
use crate::llm::types::{
    ContentBlock, ContentBlockType, HistoryEntry, MessageRole, ToolCall, ToolDefinition, UsageInfo,
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Backoff between retryable attempts.
const RETRY_BACKOFF: Duration = Duration::from_millis(300);

/// Resolved thinking directive baked into an instance at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThinkingDirective {
    /// Categorical level for premium thinking models
    Level(String),
    /// Token budget for older models
    Budget(u32),
    /// Omit thinking configuration
    Off,
}

/// A single cached model instance with its generation settings.
pub struct GeminiModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_output_tokens: u32,
    thinking: ThinkingDirective,
    max_retries: u32,
}

/// Fully parsed unary reply.
#[derive(Debug)]
pub struct ParsedReply {
    pub text: String,
    pub reasoning: String,
    pub blocks: Vec<ContentBlock>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: UsageInfo,
}

/// Translate a provider failure shape into the gateway taxonomy.
///
/// Deadline markers win over the status class so a 500 carrying
/// DEADLINE_EXCEEDED still maps to a timeout.
pub fn classify_provider_error(status: Option<u16>, message: &str) -> GatewayError {
    let lowered = message.to_lowercase();
    if status == Some(504) || lowered.contains("deadline") {
        return GatewayError::LlmTimeout(format!("Gemini deadline exceeded: {}", message));
    }
    if status == Some(429) {
        return GatewayError::LlmRateLimit(format!("Gemini rate limited: {}", message));
    }
    if let Some(code) = status {
        if code >= 500 {
            return GatewayError::LlmModel(format!("Gemini server error {}: {}", code, message));
        }
    }
    GatewayError::LlmModel(format!("Gemini API error: {}", message))
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::LlmTimeout(format!("Gemini request timed out: {}", e))
    } else {
        GatewayError::LlmModel(format!("Gemini request failed: {}", e))
    }
}

fn retryable(status: u16) -> bool {
    status == 429 || status >= 500
}

impl GeminiModel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: String,
        api_key: String,
        temperature: f64,
        max_output_tokens: u32,
        thinking: ThinkingDirective,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::LlmModel(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: GEMINI_API_BASE.to_string(),
            model,
            api_key,
            temperature,
            max_output_tokens,
            thinking,
            max_retries,
        })
    }

    /// Override the API base URL (tests and local emulators).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn thinking(&self) -> &ThinkingDirective {
        &self.thinking
    }

    fn unary_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.model, self.api_key
        )
    }

    /// Build the request body from prompt, optional system instruction, and
    /// history.
    pub fn build_body(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[HistoryEntry],
    ) -> Value {
        let mut contents: Vec<Value> = Vec::new();
        for entry in history {
            let role = match entry.role {
                MessageRole::Assistant => "model",
                // System history entries travel as user turns; the real
                // system instruction has its own top-level field.
                MessageRole::User | MessageRole::System => "user",
            };
            contents.push(json!({
                "role": role,
                "parts": [{"text": entry.content}],
            }));
        }
        contents.push(json!({
            "role": "user",
            "parts": [{"text": prompt}],
        }));

        let mut generation = json!({
            "temperature": self.temperature,
            "maxOutputTokens": self.max_output_tokens,
        });
        match &self.thinking {
            ThinkingDirective::Level(level) => {
                generation["thinkingConfig"] = json!({"thinkingLevel": level});
            }
            ThinkingDirective::Budget(budget) => {
                generation["thinkingConfig"] = json!({"thinkingBudget": budget});
            }
            ThinkingDirective::Off => {}
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation,
        });
        if let Some(system) = system_prompt {
            if !system.is_empty() {
                body["systemInstruction"] = json!({"parts": [{"text": system}]});
            }
        }
        body
    }

    /// Add schema-directed JSON output to a request body.
    pub fn apply_schema(body: &mut Value, schema: &Value) {
        body["generationConfig"]["responseMimeType"] = json!("application/json");
        body["generationConfig"]["responseSchema"] = schema.clone();
    }

    /// Add tool bindings to a request body.
    pub fn apply_tools(body: &mut Value, tools: &[ToolDefinition]) {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    /// Unary call with bounded retry on retryable statuses.
    pub async fn generate(&self, body: &Value) -> Result<ParsedReply> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self
                .http
                .post(self.unary_url())
                .json(body)
                .send()
                .await
                .map_err(map_transport_error)?;

            let status = response.status().as_u16();
            if !(200..300).contains(&status) {
                let text = response.text().await.unwrap_or_default();
                if retryable(status) && attempt < self.max_retries {
                    debug!(
                        "Gemini retryable status={} attempt={}/{}",
                        status, attempt, self.max_retries
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    continue;
                }
                return Err(classify_provider_error(Some(status), &text));
            }

            let value: Value = response.json().await.map_err(map_transport_error)?;
            return Ok(parse_reply(&value));
        }
    }

    /// Streaming call. Emits TOKEN/REASONING events followed by USAGE and a
    /// single DONE; any mid-stream failure emits a single ERROR instead.
    pub async fn stream(&self, body: &Value, tx: mpsc::Sender<StreamEvent>) {
        let request = self.http.post(self.stream_url()).json(body);
        let mut source = match EventSource::new(request) {
            Ok(source) => source,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        error: format!("Gemini stream setup failed: {}", e),
                    })
                    .await;
                return;
            }
        };

        let mut total_length = 0usize;
        let mut usage: Option<UsageInfo> = None;

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    let Ok(chunk) = serde_json::from_str::<Value>(&message.data) else {
                        continue;
                    };
                    if let Some(meta) = chunk.get("usageMetadata") {
                        usage = Some(UsageInfo::from_metadata(meta));
                    }
                    for part in chunk_parts(&chunk) {
                        match part {
                            ChunkPart::Token(text) => {
                                total_length += text.chars().count();
                                if tx.send(StreamEvent::Token { content: text }).await.is_err() {
                                    return;
                                }
                            }
                            ChunkPart::Reasoning(text) => {
                                if tx
                                    .send(StreamEvent::Reasoning { content: text })
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    warn!("Gemini stream error: {}", e);
                    let translated = classify_provider_error(None, &e.to_string());
                    let _ = tx
                        .send(StreamEvent::Error {
                            error: translated.to_string(),
                        })
                        .await;
                    return;
                }
            }
        }

        if let Some(usage) = usage {
            let _ = tx.send(StreamEvent::Usage { usage }).await;
        }
        let _ = tx
            .send(StreamEvent::Done {
                metadata: json!({"total_length": total_length}),
            })
            .await;
    }
}

enum ChunkPart {
    Token(String),
    Reasoning(String),
}

fn chunk_parts(chunk: &Value) -> Vec<ChunkPart> {
    let mut out = Vec::new();
    let parts = chunk
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);
    if let Some(parts) = parts {
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if text.is_empty() {
                    continue;
                }
                if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
                    out.push(ChunkPart::Reasoning(text.to_string()));
                } else {
                    out.push(ChunkPart::Token(text.to_string()));
                }
            }
        }
    }
    out
}

/// Classify reply parts into content blocks and extract usage.
pub fn parse_reply(value: &Value) -> ParsedReply {
    let mut blocks = Vec::new();
    let mut tool_calls = Vec::new();

    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);
    if let Some(parts) = parts {
        for (index, part) in parts.iter().enumerate() {
            if let Some(call) = part.get("functionCall") {
                let name = call
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let args = call.get("args").cloned().unwrap_or(json!({}));
                let id = call
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("call-{}", index));
                blocks.push(ContentBlock {
                    block_type: ContentBlockType::ToolCall,
                    content: String::new(),
                    tool_name: Some(name.clone()),
                    tool_args: Some(args.clone()),
                    tool_id: Some(id.clone()),
                });
                tool_calls.push(ToolCall { name, args, id });
            } else if let Some(text) = part.get("text").and_then(Value::as_str) {
                if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
                    blocks.push(ContentBlock::reasoning(text));
                } else {
                    blocks.push(ContentBlock::text(text));
                }
            } else {
                blocks.push(ContentBlock {
                    block_type: ContentBlockType::Unknown,
                    content: part.to_string(),
                    tool_name: None,
                    tool_args: None,
                    tool_id: None,
                });
            }
        }
    }

    let text: String = blocks
        .iter()
        .filter(|b| b.block_type == ContentBlockType::Text)
        .map(|b| b.content.as_str())
        .collect();
    let reasoning: String = blocks
        .iter()
        .filter(|b| b.block_type == ContentBlockType::Reasoning)
        .map(|b| b.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let usage = value
        .get("usageMetadata")
        .map(UsageInfo::from_metadata)
        .unwrap_or_default();

    ParsedReply {
        text,
        reasoning,
        blocks,
        tool_calls,
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(thinking: ThinkingDirective) -> GeminiModel {
        GeminiModel::new(
            "gemini-2.5-flash".to_string(),
            "test-key".to_string(),
            0.7,
            8192,
            thinking,
            Duration::from_secs(30),
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_build_body_basic() {
        let m = model(ThinkingDirective::Off);
        let body = m.build_body("질문입니다", Some("너는 게임 진행자다"), &[]);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "질문입니다");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "너는 게임 진행자다"
        );
        assert_eq!(body["generationConfig"]["temperature"], 0.7);
        assert!(body["generationConfig"].get("thinkingConfig").is_none());
    }

    #[test]
    fn test_build_body_history_roles() {
        let m = model(ThinkingDirective::Off);
        let history = vec![
            HistoryEntry::user("Q: 동물인가요?"),
            HistoryEntry::assistant("A: 예"),
        ];
        let body = m.build_body("다음 질문", None, &history);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "다음 질문");
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_build_body_thinking_budget() {
        let m = model(ThinkingDirective::Budget(4096));
        let body = m.build_body("x", None, &[]);
        assert_eq!(
            body["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            4096
        );
    }

    #[test]
    fn test_build_body_thinking_level() {
        let m = model(ThinkingDirective::Level("high".to_string()));
        let body = m.build_body("x", None, &[]);
        assert_eq!(
            body["generationConfig"]["thinkingConfig"]["thinkingLevel"],
            "high"
        );
    }

    #[test]
    fn test_apply_schema() {
        let m = model(ThinkingDirective::Off);
        let mut body = m.build_body("x", None, &[]);
        GeminiModel::apply_schema(
            &mut body,
            &json!({"type": "object", "properties": {"answer": {"type": "string"}}}),
        );
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            body["generationConfig"]["responseSchema"]["type"],
            "object"
        );
    }

    #[test]
    fn test_apply_tools() {
        let m = model(ThinkingDirective::Off);
        let mut body = m.build_body("x", None, &[]);
        let tool = ToolDefinition::new(
            "lookup",
            "Look something up",
            json!({"type": "object", "properties": {}}),
        );
        GeminiModel::apply_tools(&mut body, &[tool]);
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "lookup");
    }

    #[test]
    fn test_classify_deadline() {
        let err = classify_provider_error(Some(504), "gateway timeout");
        assert!(matches!(err, GatewayError::LlmTimeout(_)));
        let err = classify_provider_error(Some(500), "DEADLINE_EXCEEDED while calling");
        assert!(matches!(err, GatewayError::LlmTimeout(_)));
        let err = classify_provider_error(None, "deadline exceeded");
        assert!(matches!(err, GatewayError::LlmTimeout(_)));
    }

    #[test]
    fn test_classify_server_and_rate_limit() {
        assert!(matches!(
            classify_provider_error(Some(500), "internal"),
            GatewayError::LlmModel(_)
        ));
        assert!(matches!(
            classify_provider_error(Some(503), "unavailable"),
            GatewayError::LlmModel(_)
        ));
        assert!(matches!(
            classify_provider_error(Some(429), "quota"),
            GatewayError::LlmRateLimit(_)
        ));
        assert!(matches!(
            classify_provider_error(Some(400), "bad request"),
            GatewayError::LlmModel(_)
        ));
        assert!(matches!(
            classify_provider_error(None, "weird"),
            GatewayError::LlmModel(_)
        ));
    }

    #[test]
    fn test_parse_reply_text_and_reasoning() {
        let value = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "생각 중", "thought": true},
                        {"text": "예"}
                    ]
                }
            }],
            "usageMetadata": {
                "promptTokenCount": 100,
                "candidatesTokenCount": 10,
                "totalTokenCount": 140,
                "thoughtsTokenCount": 30
            }
        });
        let reply = parse_reply(&value);
        assert_eq!(reply.text, "예");
        assert_eq!(reply.reasoning, "생각 중");
        assert_eq!(reply.blocks.len(), 2);
        assert_eq!(reply.blocks[0].block_type, ContentBlockType::Reasoning);
        assert_eq!(reply.usage.input_tokens, 100);
        assert_eq!(reply.usage.reasoning_tokens, 30);
    }

    #[test]
    fn test_parse_reply_tool_calls() {
        let value = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"functionCall": {"name": "lookup", "args": {"q": "말"}}}
                    ]
                }
            }]
        });
        let reply = parse_reply(&value);
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "lookup");
        assert_eq!(reply.tool_calls[0].args["q"], "말");
        assert_eq!(reply.tool_calls[0].id, "call-0");
        assert_eq!(reply.blocks[0].block_type, ContentBlockType::ToolCall);
    }

    #[test]
    fn test_parse_reply_unknown_block() {
        let value = json!({
            "candidates": [{
                "content": {"parts": [{"inlineData": {"mimeType": "image/png"}}]}
            }]
        });
        let reply = parse_reply(&value);
        assert_eq!(reply.blocks[0].block_type, ContentBlockType::Unknown);
        assert!(reply.text.is_empty());
    }

    #[test]
    fn test_parse_reply_empty() {
        let reply = parse_reply(&json!({}));
        assert!(reply.blocks.is_empty());
        assert_eq!(reply.usage, UsageInfo::default());
    }
}
