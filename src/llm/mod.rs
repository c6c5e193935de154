//! LLM client layer: Gemini transport, instance caching, streaming.

pub mod client;
pub mod gemini;
pub mod streaming;
pub mod types;

pub use client::{LlmClient, UsageObserver};
pub use gemini::{GeminiModel, ThinkingDirective, classify_provider_error};
pub use streaming::{EventStream, StreamEvent, event_channel};
pub use types::{
    ChatResult, ContentBlock, ContentBlockType, HistoryEntry, MessageRole, TaskKind, ToolCall,
    ToolDefinition, UsageInfo,
};
