//! LLM types shared across the client, pipelines, and HTTP layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Task tags selecting per-task model and thinking configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Hints,
    Answer,
    Verify,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Hints => "hints",
            TaskKind::Answer => "answer",
            TaskKind::Verify => "verify",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hints" => Some(TaskKind::Hints),
            "answer" => Some(TaskKind::Answer),
            "verify" => Some(TaskKind::Verify),
            _ => None,
        }
    }
}

/// Message roles in conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One conversation-history entry in role/content projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Content block kinds in a model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentBlockType {
    Text,
    Reasoning,
    ToolCall,
    ToolResult,
    Unknown,
}

/// A parsed content block.
#[derive(Debug, Clone, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: ContentBlockType,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
}

impl ContentBlock {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            block_type: ContentBlockType::Text,
            content: content.into(),
            tool_name: None,
            tool_args: None,
            tool_id: None,
        }
    }

    pub fn reasoning(content: impl Into<String>) -> Self {
        Self {
            block_type: ContentBlockType::Reasoning,
            content: content.into(),
            tool_name: None,
            tool_args: None,
            tool_id: None,
        }
    }
}

/// Token usage for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInfo {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub reasoning_tokens: u64,
}

impl UsageInfo {
    /// Read usage counts from a provider metadata object. Accepts both the
    /// REST camelCase shape and the snake_case shape with an
    /// `output_token_details.reasoning` sub-field.
    pub fn from_metadata(meta: &Value) -> Self {
        let read = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| meta.get(k).and_then(Value::as_u64))
                .unwrap_or(0)
        };
        let reasoning = meta
            .get("output_token_details")
            .and_then(|d| d.get("reasoning"))
            .and_then(Value::as_u64)
            .or_else(|| meta.get("thoughtsTokenCount").and_then(Value::as_u64))
            .unwrap_or(0);
        Self {
            input_tokens: read(&["promptTokenCount", "input_tokens"]),
            output_tokens: read(&["candidatesTokenCount", "output_tokens"]),
            total_tokens: read(&["totalTokenCount", "total_tokens"]),
            reasoning_tokens: reasoning,
        }
    }
}

/// A tool-call request from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
    #[serde(default)]
    pub id: String,
}

/// A tool the model may bind to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Extended chat response with usage and content blocks.
#[derive(Debug, Clone)]
pub struct ChatResult {
    pub text: String,
    pub usage: UsageInfo,
    pub blocks: Vec<ContentBlock>,
    pub reasoning: String,
}

impl ChatResult {
    pub fn has_reasoning(&self) -> bool {
        !self.reasoning.is_empty()
            || self
                .blocks
                .iter()
                .any(|b| b.block_type == ContentBlockType::Reasoning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_kind_names() {
        assert_eq!(TaskKind::Hints.as_str(), "hints");
        assert_eq!(TaskKind::from_name("verify"), Some(TaskKind::Verify));
        assert_eq!(TaskKind::from_name("bogus"), None);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_usage_from_rest_metadata() {
        let usage = UsageInfo::from_metadata(&json!({
            "promptTokenCount": 120,
            "candidatesTokenCount": 40,
            "totalTokenCount": 200,
            "thoughtsTokenCount": 40
        }));
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 40);
        assert_eq!(usage.total_tokens, 200);
        assert_eq!(usage.reasoning_tokens, 40);
    }

    #[test]
    fn test_usage_from_snake_case_metadata() {
        let usage = UsageInfo::from_metadata(&json!({
            "input_tokens": 10,
            "output_tokens": 5,
            "total_tokens": 15,
            "output_token_details": {"reasoning": 3}
        }));
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.reasoning_tokens, 3);
    }

    #[test]
    fn test_usage_missing_fields_default_to_zero() {
        let usage = UsageInfo::from_metadata(&json!({}));
        assert_eq!(usage, UsageInfo::default());
    }

    #[test]
    fn test_chat_result_has_reasoning() {
        let without = ChatResult {
            text: "x".into(),
            usage: UsageInfo::default(),
            blocks: vec![ContentBlock::text("x")],
            reasoning: String::new(),
        };
        assert!(!without.has_reasoning());

        let with = ChatResult {
            text: "x".into(),
            usage: UsageInfo::default(),
            blocks: vec![ContentBlock::reasoning("생각")],
            reasoning: String::new(),
        };
        assert!(with.has_reasoning());
    }
}
