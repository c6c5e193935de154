//! Twenty-questions pipelines.
//!
//! Each operation runs the same spine: guard the input, resolve the
//! session, fetch trimmed history, compose prompts around the TOON-encoded
//! secret, call the model under the timeout envelope, parse the verdict
//! with one hinted retry, then append the exchange to history.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::Settings;
use crate::error::{GatewayError, Result};
use crate::games::common::{
    ANSWER_PREFIX, QUESTION_PREFIX, invoke_with_timeout, qa_history_context, resolve_verdict,
};
use crate::guard::{InjectionGuard, ensure_safe};
use crate::id::resolve_session_id;
use crate::llm::{HistoryEntry, LlmClient, TaskKind};
use crate::prompt::{PromptRegistry, render, render_with};
use crate::session::SessionManager;
use crate::toon::encode_secret;

/// Default namespace for derived twenty-questions session ids.
const DEFAULT_NAMESPACE: &str = "twentyq";

const HISTORY_HEADER: &str = "이전 질문과 답변:";

/// 5-scale answer literals in parse order. The order is load-bearing: the
/// scan matches "예" before "아마도 예" and the bots encode that behavior.
pub const ANSWER_SCALE: &[&str] = &["예", "아마도 예", "아마도 아니오", "아니오"];

/// Guess verification literals.
pub const VERIFY_RESULTS: &[&str] = &["정답", "근접", "오답"];

/// Synonym-check literals.
pub const SYNONYM_RESULTS: &[&str] = &["동일", "상이"];

/// Forbidden words per category so hints never name the category itself.
fn forbidden_words(category: &str) -> Vec<String> {
    let known: &[&str] = match category {
        "음식" => &["음식", "먹을 것", "식품"],
        "동물" => &["동물", "생물", "생명체"],
        "사물" => &["사물", "물건", "도구"],
        "장소" => &["장소", "곳", "위치"],
        "인물" => &["인물", "사람", "인간"],
        "개념" => &["개념", "추상적", "관념"],
        _ => return vec![category.to_string()],
    };
    known.iter().map(|w| w.to_string()).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct HintsResponse {
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub scale: Option<String>,
    pub raw_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub result: Option<String>,
    pub raw_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizeResponse {
    pub normalized: String,
    pub original: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynonymResponse {
    pub result: Option<String>,
    pub raw_text: String,
}

/// Twenty-questions task pipeline.
pub struct TwentyQPipeline {
    llm: Arc<LlmClient>,
    sessions: Arc<SessionManager>,
    guard: Arc<InjectionGuard>,
    prompts: Arc<PromptRegistry>,
    timeout_secs: u64,
    history_max_pairs: usize,
    default_model: String,
}

impl TwentyQPipeline {
    pub fn new(
        llm: Arc<LlmClient>,
        sessions: Arc<SessionManager>,
        guard: Arc<InjectionGuard>,
        prompts: Arc<PromptRegistry>,
        settings: &Settings,
    ) -> Self {
        Self {
            llm,
            sessions,
            guard,
            prompts,
            timeout_secs: settings.llm.timeout_secs,
            history_max_pairs: settings.session.history_max_pairs,
            default_model: settings.llm.default_model.clone(),
        }
    }

    /// Resolve the effective session id for this endpoint.
    pub fn session_id(
        &self,
        session_id: Option<&str>,
        chat_id: Option<&str>,
        namespace: Option<&str>,
    ) -> Option<String> {
        resolve_session_id(session_id, chat_id, namespace, DEFAULT_NAMESPACE)
    }

    /// Generate hints for the secret.
    pub async fn hints(
        &self,
        target: &str,
        category: Option<&str>,
        details: Option<&Value>,
    ) -> Result<HintsResponse> {
        let entry = self.prompts.get("hints")?;
        let mut system = entry.system.clone();
        if let Some(category) = category {
            let restriction = entry.extra("category_restriction");
            if !restriction.is_empty() {
                let forbidden = forbidden_words(category).join(", ");
                let rendered = render_with(
                    restriction,
                    &[
                        ("selectedCategory", category),
                        ("forbiddenWords", forbidden.as_str()),
                    ],
                )?;
                system.push_str("\n\n");
                system.push_str(&rendered);
            }
        }

        let toon = encode_secret(target, category.unwrap_or("사물"), details);
        let user = render_with(&entry.user, &[("toon", toon.as_str())])?;
        let model = self.llm.model_for_task(Some(TaskKind::Hints)).to_string();

        let schema = json!({
            "type": "object",
            "properties": {
                "hints": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["hints"]
        });
        let value = invoke_with_timeout(
            self.timeout_secs,
            "twentyq.hints",
            None,
            self.llm
                .chat_structured(&user, &schema, Some(&system), &[], Some(&model)),
        )
        .await?;

        let hints = value
            .get("hints")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if hints.is_empty() {
            return Err(GatewayError::LlmParsing(
                "Hint generation returned no hints".to_string(),
            ));
        }
        Ok(HintsResponse { hints })
    }

    /// Answer a yes/no question about the secret on the 5-scale.
    #[allow(clippy::too_many_arguments)]
    pub async fn answer(
        &self,
        question: &str,
        target: &str,
        category: Option<&str>,
        details: Option<&Value>,
        session_id: Option<&str>,
        chat_id: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<AnswerResponse> {
        ensure_safe(&self.guard, question).await?;

        let session = self.session_id(session_id, chat_id, namespace);
        let entry = self.prompts.get("answer")?;

        let context = match &session {
            Some(id) => {
                self.sessions
                    .create_session(id, &self.default_model, Some(&entry.system))
                    .await?;
                let history = self.sessions.get_history(id).await?;
                qa_history_context(&history, HISTORY_HEADER, self.history_max_pairs)
            }
            None => String::new(),
        };

        let toon = encode_secret(target, category.unwrap_or("사물"), details);
        let mut vars = HashMap::new();
        vars.insert("toon".to_string(), toon);
        vars.insert("question".to_string(), question.to_string());
        let mut user = render(&entry.user, &vars)?;
        user.push_str(&context);

        let schema = json!({
            "type": "object",
            "properties": {"answer": {"type": "string"}},
            "required": ["answer"]
        });
        let model = self.llm.model_for_task(Some(TaskKind::Answer)).to_string();
        let structured = invoke_with_timeout(
            self.timeout_secs,
            "twentyq.answer",
            session.as_deref(),
            self.llm
                .chat_structured(&user, &schema, Some(&entry.system), &[], Some(&model)),
        )
        .await
        .ok()
        .and_then(|v| v.get("answer").and_then(Value::as_str).map(str::to_string));

        let (verdict, raw_text) = resolve_verdict(
            &self.llm,
            ANSWER_SCALE,
            structured,
            &user,
            Some(&entry.system),
            Some(&model),
            Some(TaskKind::Answer),
            self.timeout_secs,
            "twentyq.answer",
            session.as_deref(),
        )
        .await?;

        if let Some(id) = &session {
            let shown = verdict.map(str::to_string).unwrap_or_else(|| raw_text.clone());
            self.sessions
                .add_messages(
                    id,
                    &[
                        HistoryEntry::user(format!("{}{}", QUESTION_PREFIX, question)),
                        HistoryEntry::assistant(format!("{}{}", ANSWER_PREFIX, shown)),
                    ],
                )
                .await?;
        }

        Ok(AnswerResponse {
            scale: verdict.map(str::to_string),
            raw_text,
        })
    }

    /// Verify a guess against the secret target.
    pub async fn verify(&self, target: &str, guess: &str) -> Result<VerifyResponse> {
        ensure_safe(&self.guard, guess).await?;

        let entry = self.prompts.get("verify-answer")?;
        let user = render_with(&entry.user, &[("target", target), ("guess", guess)])?;
        let model = self.llm.model_for_task(Some(TaskKind::Verify)).to_string();

        let schema = json!({
            "type": "object",
            "properties": {"result": {"type": "string"}},
            "required": ["result"]
        });
        let structured = invoke_with_timeout(
            self.timeout_secs,
            "twentyq.verify",
            None,
            self.llm
                .chat_structured(&user, &schema, Some(&entry.system), &[], Some(&model)),
        )
        .await
        .ok()
        .and_then(|v| v.get("result").and_then(Value::as_str).map(str::to_string));

        let (verdict, raw_text) = resolve_verdict(
            &self.llm,
            VERIFY_RESULTS,
            structured,
            &user,
            Some(&entry.system),
            Some(&model),
            Some(TaskKind::Verify),
            self.timeout_secs,
            "twentyq.verify",
            None,
        )
        .await?;

        Ok(VerifyResponse {
            result: verdict.map(str::to_string),
            raw_text,
        })
    }

    /// Normalize a free-form question into canonical form.
    pub async fn normalize(&self, question: &str) -> Result<NormalizeResponse> {
        ensure_safe(&self.guard, question).await?;

        let entry = self.prompts.get("normalize")?;
        let user = render_with(&entry.user, &[("question", question)])?;

        let schema = json!({
            "type": "object",
            "properties": {"normalized": {"type": "string"}},
            "required": ["normalized"]
        });
        let structured = invoke_with_timeout(
            self.timeout_secs,
            "twentyq.normalize",
            None,
            self.llm
                .chat_structured(&user, &schema, Some(&entry.system), &[], None),
        )
        .await;

        let normalized = match structured {
            Ok(value) => value
                .get("normalized")
                .and_then(Value::as_str)
                .unwrap_or(question)
                .to_string(),
            Err(_) => invoke_with_timeout(
                self.timeout_secs,
                "twentyq.normalize",
                None,
                self.llm.chat(&user, Some(&entry.system), &[], None),
            )
            .await?
            .trim()
            .to_string(),
        };

        Ok(NormalizeResponse {
            normalized,
            original: question.to_string(),
        })
    }

    /// Check whether a guess is synonymous with the target.
    pub async fn synonym_check(&self, target: &str, guess: &str) -> Result<SynonymResponse> {
        ensure_safe(&self.guard, guess).await?;

        let entry = self.prompts.get("synonym-check")?;
        let user = render_with(&entry.user, &[("target", target), ("guess", guess)])?;

        let schema = json!({
            "type": "object",
            "properties": {"result": {"type": "string"}},
            "required": ["result"]
        });
        let structured = invoke_with_timeout(
            self.timeout_secs,
            "twentyq.synonym",
            None,
            self.llm
                .chat_structured(&user, &schema, Some(&entry.system), &[], None),
        )
        .await
        .ok()
        .and_then(|v| v.get("result").and_then(Value::as_str).map(str::to_string));

        let (verdict, raw_text) = resolve_verdict(
            &self.llm,
            SYNONYM_RESULTS,
            structured,
            &user,
            Some(&entry.system),
            None,
            None,
            self.timeout_secs,
            "twentyq.synonym",
            None,
        )
        .await?;

        Ok(SynonymResponse {
            result: verdict.map(str::to_string),
            raw_text,
        })
    }
}
