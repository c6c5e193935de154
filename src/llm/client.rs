//! LLM client facade.
//!
//! Owns the model-instance cache (keyed by model + task, because per-task
//! thinking configuration is baked in at construction), the API-key
//! round-robin, thinking resolution, and key failover. All operations
//! return taxonomy errors only.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};
use lru::LruCache;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::LlmSettings;
use crate::error::{GatewayError, Result};
use crate::llm::gemini::{GeminiModel, ParsedReply, ThinkingDirective};
use crate::llm::streaming::{EventStream, StreamEvent, event_channel};
use crate::llm::types::{ChatResult, HistoryEntry, TaskKind, ToolCall, ToolDefinition, UsageInfo};

/// Observer notified with token usage after each completed call.
pub trait UsageObserver: Send + Sync {
    fn on_usage(&self, usage: &UsageInfo);
    fn on_error(&self) {}
}

type CacheKey = (String, Option<TaskKind>);

/// Facade over the Gemini transport with instance caching and key rotation.
pub struct LlmClient {
    settings: LlmSettings,
    cache: Mutex<LruCache<CacheKey, Arc<GeminiModel>>>,
    key_index: Mutex<usize>,
    observers: Vec<Arc<dyn UsageObserver>>,
}

impl LlmClient {
    pub fn new(settings: LlmSettings, observers: Vec<Arc<dyn UsageObserver>>) -> Self {
        let capacity =
            NonZeroUsize::new(settings.model_cache_size).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            settings,
            cache: Mutex::new(LruCache::new(capacity)),
            key_index: Mutex::new(0),
            observers,
        }
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    /// Model name for a task, falling back to the default model.
    pub fn model_for_task(&self, task: Option<TaskKind>) -> &str {
        self.settings.model_for(task.map(|t| t.as_str()))
    }

    /// Next API key in strict round-robin order.
    fn select_api_key(&self) -> Result<String> {
        if self.settings.api_keys.is_empty() {
            return Err(GatewayError::LlmModel(
                "No Gemini API keys configured".to_string(),
            ));
        }
        let mut index = self.key_index.lock().expect("key index lock poisoned");
        let key = self.settings.api_keys[*index % self.settings.api_keys.len()].clone();
        *index += 1;
        Ok(key)
    }

    /// Normalize a configured thinking level to supported values.
    fn normalize_thinking_level(level: &str) -> Option<String> {
        match level.to_lowercase().as_str() {
            "low" | "high" => Some(level.to_lowercase()),
            "medium" => Some("high".to_string()),
            "none" => None,
            other => {
                warn!("Unsupported thinking level '{}', skipping", other);
                None
            }
        }
    }

    /// Resolve the thinking directive for a model/task combination.
    fn resolve_thinking(&self, model: &str, task: Option<TaskKind>) -> ThinkingDirective {
        let task_name = task.map(|t| t.as_str());
        if crate::config::is_premium_thinking(model) {
            let configured = self.settings.thinking.level_for(task_name);
            match Self::normalize_thinking_level(configured) {
                Some(level) => {
                    debug!(
                        "Thinking level: model={} task={:?} level={}",
                        model, task_name, level
                    );
                    ThinkingDirective::Level(level)
                }
                None => ThinkingDirective::Off,
            }
        } else {
            match self.settings.thinking.budget_for(task_name) {
                Some(budget) => {
                    debug!(
                        "Thinking budget: model={} task={:?} budget={}",
                        model, task_name, budget
                    );
                    ThinkingDirective::Budget(budget)
                }
                None => ThinkingDirective::Off,
            }
        }
    }

    fn create_model(&self, model: &str, task: Option<TaskKind>) -> Result<GeminiModel> {
        let api_key = self.select_api_key()?;
        GeminiModel::new(
            model.to_string(),
            api_key,
            self.settings.temperature_for(model),
            self.settings.max_output_tokens,
            self.resolve_thinking(model, task),
            Duration::from_secs(self.settings.timeout_secs),
            self.settings.max_retries,
        )
    }

    /// Get or create the cached instance for (model, task).
    fn get_model(&self, model: Option<&str>, task: Option<TaskKind>) -> Result<Arc<GeminiModel>> {
        let name = model.unwrap_or(&self.settings.default_model).to_string();
        let key = (name.clone(), task);
        let mut cache = self.cache.lock().expect("model cache lock poisoned");
        if let Some(cached) = cache.get(&key) {
            return Ok(Arc::clone(cached));
        }
        let created = Arc::new(self.create_model(&name, task)?);
        cache.put(key, Arc::clone(&created));
        Ok(created)
    }

    fn evict(&self, model: &str, task: Option<TaskKind>) {
        let mut cache = self.cache.lock().expect("model cache lock poisoned");
        cache.pop(&(model.to_string(), task));
    }

    fn notify_usage(&self, usage: &UsageInfo) {
        for observer in &self.observers {
            observer.on_usage(usage);
        }
    }

    fn notify_error(&self) {
        for observer in &self.observers {
            observer.on_error();
        }
    }

    /// Run a unary call, rotating to the next key on model errors up to the
    /// configured failover attempts.
    async fn generate_with_failover<F>(
        &self,
        model: Option<&str>,
        task: Option<TaskKind>,
        build: F,
    ) -> Result<ParsedReply>
    where
        F: Fn(&GeminiModel) -> Value,
    {
        let name = model.unwrap_or(&self.settings.default_model).to_string();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let instance = self.get_model(Some(&name), task)?;
            let body = build(&instance);
            match instance.generate(&body).await {
                Ok(reply) => {
                    self.notify_usage(&reply.usage);
                    return Ok(reply);
                }
                Err(err @ GatewayError::LlmModel(_))
                    if attempt < self.settings.failover_attempts =>
                {
                    warn!(
                        "LLM failover attempt {}/{} for model {}: {}",
                        attempt, self.settings.failover_attempts, name, err
                    );
                    self.evict(&name, task);
                    continue;
                }
                Err(err) => {
                    self.notify_error();
                    return Err(err);
                }
            }
        }
    }

    /// Stateless chat: string in, string out.
    pub async fn chat(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[HistoryEntry],
        model: Option<&str>,
    ) -> Result<String> {
        let reply = self
            .generate_with_failover(model, None, |instance| {
                instance.build_body(prompt, system_prompt, history)
            })
            .await?;
        Ok(reply.text)
    }

    /// Schema-directed chat returning a validated JSON value.
    pub async fn chat_structured(
        &self,
        prompt: &str,
        schema: &Value,
        system_prompt: Option<&str>,
        history: &[HistoryEntry],
        model: Option<&str>,
    ) -> Result<Value> {
        let reply = self
            .generate_with_failover(model, None, |instance| {
                let mut body = instance.build_body(prompt, system_prompt, history);
                GeminiModel::apply_schema(&mut body, schema);
                body
            })
            .await?;
        serde_json::from_str(&reply.text)
            .map_err(|e| GatewayError::LlmParsing(format!("Structured output failed: {}", e)))
    }

    /// Chat with tool binding: text plus requested tool calls.
    pub async fn chat_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDefinition],
        system_prompt: Option<&str>,
        history: &[HistoryEntry],
        model: Option<&str>,
    ) -> Result<(String, Vec<ToolCall>)> {
        let reply = self
            .generate_with_failover(model, None, |instance| {
                let mut body = instance.build_body(prompt, system_prompt, history);
                GeminiModel::apply_tools(&mut body, tools);
                body
            })
            .await?;
        Ok((reply.text, reply.tool_calls))
    }

    /// Chat returning text, content blocks, reasoning, and usage.
    pub async fn chat_with_usage(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[HistoryEntry],
        model: Option<&str>,
        task: Option<TaskKind>,
    ) -> Result<ChatResult> {
        let name = model
            .map(str::to_string)
            .unwrap_or_else(|| self.model_for_task(task).to_string());
        let reply = self
            .generate_with_failover(Some(&name), task, |instance| {
                instance.build_body(prompt, system_prompt, history)
            })
            .await?;
        Ok(ChatResult {
            text: reply.text,
            usage: reply.usage,
            blocks: reply.blocks,
            reasoning: reply.reasoning,
        })
    }

    /// Typed event stream (TOKEN/REASONING/USAGE then exactly one DONE or
    /// ERROR).
    pub async fn stream_events(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[HistoryEntry],
        model: Option<&str>,
        task: Option<TaskKind>,
    ) -> Result<EventStream> {
        let name = model
            .map(str::to_string)
            .unwrap_or_else(|| self.model_for_task(task).to_string());
        let instance = self.get_model(Some(&name), task)?;
        let body = instance.build_body(prompt, system_prompt, history);

        let (raw_tx, mut raw_rx) = mpsc::channel(32);
        let (tx, stream) = event_channel(32);

        tokio::spawn(async move {
            instance.stream(&body, raw_tx).await;
        });

        let observers = self.observers.clone();
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                if let StreamEvent::Usage { usage } = &event {
                    for observer in &observers {
                        observer.on_usage(usage);
                    }
                }
                let terminal = event.is_terminal();
                if tx.send(event).await.is_err() || terminal {
                    break;
                }
            }
        });

        Ok(stream)
    }

    /// Plain text streaming; the typed stream filtered to tokens happens at
    /// the transport layer.
    pub async fn stream(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[HistoryEntry],
        model: Option<&str>,
    ) -> Result<EventStream> {
        self.stream_events(prompt, system_prompt, history, model, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_keys(keys: &[&str]) -> LlmSettings {
        LlmSettings {
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..LlmSettings::default()
        }
    }

    fn client(keys: &[&str]) -> LlmClient {
        LlmClient::new(settings_with_keys(keys), Vec::new())
    }

    #[test]
    fn test_key_rotation_round_robin() {
        let client = client(&["k1", "k2", "k3"]);
        let picked: Vec<String> = (0..6).map(|_| client.select_api_key().unwrap()).collect();
        assert_eq!(picked, vec!["k1", "k2", "k3", "k1", "k2", "k3"]);
    }

    #[test]
    fn test_empty_key_pool_fails() {
        let client = client(&[]);
        let err = client.select_api_key().unwrap_err();
        assert!(matches!(err, GatewayError::LlmModel(_)));
        assert!(client.get_model(None, None).is_err());
    }

    #[test]
    fn test_instance_cache_by_model_and_task() {
        let client = client(&["k1"]);
        let a = client.get_model(Some("gemini-2.5-flash"), Some(TaskKind::Answer)).unwrap();
        let b = client.get_model(Some("gemini-2.5-flash"), Some(TaskKind::Answer)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = client.get_model(Some("gemini-2.5-flash"), Some(TaskKind::Verify)).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));

        let d = client.get_model(Some("gemini-2.5-pro"), Some(TaskKind::Answer)).unwrap();
        assert!(!Arc::ptr_eq(&a, &d));
    }

    #[test]
    fn test_eviction_creates_new_instance() {
        let client = client(&["k1", "k2"]);
        let a = client.get_model(Some("gemini-2.5-flash"), None).unwrap();
        client.evict("gemini-2.5-flash", None);
        let b = client.get_model(Some("gemini-2.5-flash"), None).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_normalize_thinking_level() {
        assert_eq!(
            LlmClient::normalize_thinking_level("low"),
            Some("low".to_string())
        );
        assert_eq!(
            LlmClient::normalize_thinking_level("HIGH"),
            Some("high".to_string())
        );
        assert_eq!(
            LlmClient::normalize_thinking_level("medium"),
            Some("high".to_string())
        );
        assert_eq!(LlmClient::normalize_thinking_level("none"), None);
        assert_eq!(LlmClient::normalize_thinking_level("extreme"), None);
    }

    #[test]
    fn test_resolve_thinking_premium_level() {
        let client = client(&["k1"]);
        let directive = client.resolve_thinking("gemini-3-pro-preview", Some(TaskKind::Answer));
        assert_eq!(directive, ThinkingDirective::Level("low".to_string()));
    }

    #[test]
    fn test_resolve_thinking_budget_for_older_models() {
        let client = client(&["k1"]);
        let directive = client.resolve_thinking("gemini-2.5-flash", Some(TaskKind::Hints));
        assert_eq!(directive, ThinkingDirective::Budget(8192));
        // No default budget configured for the no-task slot.
        let directive = client.resolve_thinking("gemini-2.5-flash", None);
        assert_eq!(directive, ThinkingDirective::Off);
    }

    #[test]
    fn test_model_for_task() {
        let mut settings = settings_with_keys(&["k1"]);
        settings.verify_model = "gemini-2.5-pro".to_string();
        let client = LlmClient::new(settings, Vec::new());
        assert_eq!(client.model_for_task(Some(TaskKind::Verify)), "gemini-2.5-pro");
        assert_eq!(
            client.model_for_task(Some(TaskKind::Answer)),
            "gemini-2.5-flash-preview-09-2025"
        );
    }
}
