//! Turtle-soup (lateral thinking puzzle) pipelines.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::Settings;
use crate::error::Result;
use crate::games::common::{
    ANSWER_PREFIX, QUESTION_PREFIX, invoke_with_timeout, qa_history_context, qa_pairs,
    resolve_verdict, scan_enum,
};
use crate::guard::{InjectionGuard, ensure_safe};
use crate::id::resolve_session_id;
use crate::llm::{HistoryEntry, LlmClient, TaskKind};
use crate::prompt::{PromptRegistry, render, render_with};
use crate::session::SessionManager;
use crate::toon::encode_puzzle;

/// Default namespace for derived turtle-soup session ids.
const DEFAULT_NAMESPACE: &str = "turtle";

const HISTORY_HEADER: &str = "이전 질문과 답변:";

/// Answer-type literals scanned in this order; the importance marker is
/// checked separately.
pub const BASE_ANSWERS: &[&str] = &[
    "예",
    "아니오",
    "관계없습니다",
    "조금은 관계있습니다",
    "전제가 틀렸습니다",
    "답변할 수 없습니다",
];

/// Importance marker appended to important questions.
pub const IMPORTANT_MARKER: &str = "중요한 질문입니다!";

/// Solution validation literals.
pub const VALIDATION_RESULTS: &[&str] = &["YES", "NO", "CLOSE"];

/// Compose the final answer string with the importance marker.
pub fn format_answer_text(answer: Option<&str>, is_important: bool, raw_text: &str) -> String {
    let Some(answer) = answer else {
        return raw_text.to_string();
    };
    if !is_important {
        return answer.to_string();
    }
    if answer == "아니오" {
        format!("아니오 하지만 {}", IMPORTANT_MARKER)
    } else {
        format!("{}, {}", answer, IMPORTANT_MARKER)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionHistoryItem {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurtleAnswerResponse {
    pub answer: String,
    pub raw_text: String,
    pub question_count: usize,
    pub history: Vec<QuestionHistoryItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HintResponse {
    pub hint: String,
    pub level: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResponse {
    pub result: Option<String>,
    pub raw_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevealResponse {
    pub narrative: String,
}

/// Turtle-soup task pipeline.
pub struct TurtlePipeline {
    llm: Arc<LlmClient>,
    sessions: Arc<SessionManager>,
    guard: Arc<InjectionGuard>,
    prompts: Arc<PromptRegistry>,
    timeout_secs: u64,
    history_max_pairs: usize,
    default_model: String,
}

impl TurtlePipeline {
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

    pub fn session_id(
        &self,
        session_id: Option<&str>,
        chat_id: Option<&str>,
        namespace: Option<&str>,
    ) -> Option<String> {
        resolve_session_id(session_id, chat_id, namespace, DEFAULT_NAMESPACE)
    }

    /// Answer a player question about the puzzle.
    #[allow(clippy::too_many_arguments)]
    pub async fn answer(
        &self,
        question: &str,
        scenario: &str,
        solution: &str,
        session_id: Option<&str>,
        chat_id: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<TurtleAnswerResponse> {
        ensure_safe(&self.guard, question).await?;

        let session = self.session_id(session_id, chat_id, namespace);
        let entry = self.prompts.get("answer")?;

        let (context, prior_history) = match &session {
            Some(id) => {
                self.sessions
                    .create_session(id, &self.default_model, Some(&entry.system))
                    .await?;
                let history = self.sessions.get_history(id).await?;
                (
                    qa_history_context(&history, HISTORY_HEADER, self.history_max_pairs),
                    history,
                )
            }
            None => (String::new(), Vec::new()),
        };

        let puzzle = encode_puzzle(scenario, solution, None, None);
        let mut vars = HashMap::new();
        vars.insert("puzzle".to_string(), puzzle);
        vars.insert("question".to_string(), question.to_string());
        vars.insert("history".to_string(), context);
        let user = render(&entry.user, &vars)?;

        let schema = json!({
            "type": "object",
            "properties": {
                "answer": {"type": "string"},
                "important": {"type": "boolean"}
            },
            "required": ["answer"]
        });
        let model = self.llm.model_for_task(Some(TaskKind::Answer)).to_string();
        let structured = invoke_with_timeout(
            self.timeout_secs,
            "turtle.answer",
            session.as_deref(),
            self.llm
                .chat_structured(&user, &schema, Some(&entry.system), &[], Some(&model)),
        )
        .await
        .ok();

        let structured_text = structured
            .as_ref()
            .and_then(|v| v.get("answer").and_then(Value::as_str).map(str::to_string));

        let (verdict, raw_text) = resolve_verdict(
            &self.llm,
            BASE_ANSWERS,
            structured_text,
            &user,
            Some(&entry.system),
            Some(&model),
            Some(TaskKind::Answer),
            self.timeout_secs,
            "turtle.answer",
            session.as_deref(),
        )
        .await?;

        let is_important = raw_text.contains(IMPORTANT_MARKER)
            || structured
                .as_ref()
                .and_then(|v| v.get("important").and_then(Value::as_bool))
                .unwrap_or(false);
        let answer_text = format_answer_text(verdict, is_important, &raw_text);

        let mut history_items: Vec<QuestionHistoryItem> = qa_pairs(&prior_history)
            .into_iter()
            .map(|(question, answer)| QuestionHistoryItem { question, answer })
            .collect();
        history_items.push(QuestionHistoryItem {
            question: question.to_string(),
            answer: answer_text.clone(),
        });
        let question_count = history_items.len();

        if let Some(id) = &session {
            self.sessions
                .add_messages(
                    id,
                    &[
                        HistoryEntry::user(format!("{}{}", QUESTION_PREFIX, question)),
                        HistoryEntry::assistant(format!("{}{}", ANSWER_PREFIX, answer_text)),
                    ],
                )
                .await?;
        }

        Ok(TurtleAnswerResponse {
            answer: answer_text,
            raw_text,
            question_count,
            history: history_items,
        })
    }

    /// Generate a progressive hint for the puzzle.
    pub async fn hint(&self, scenario: &str, solution: &str, level: u32) -> Result<HintResponse> {
        let entry = self.prompts.get("hint")?;
        let puzzle = encode_puzzle(scenario, solution, None, None);
        let level_text = level.to_string();
        let user = render_with(
            &entry.user,
            &[("puzzle", puzzle.as_str()), ("level", level_text.as_str())],
        )?;

        let schema = json!({
            "type": "object",
            "properties": {"hint": {"type": "string"}},
            "required": ["hint"]
        });
        let model = self.llm.model_for_task(Some(TaskKind::Hints)).to_string();
        let value = invoke_with_timeout(
            self.timeout_secs,
            "turtle.hint",
            None,
            self.llm
                .chat_structured(&user, &schema, Some(&entry.system), &[], Some(&model)),
        )
        .await;

        let hint = match value {
            Ok(v) => v
                .get("hint")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Err(_) => invoke_with_timeout(
                self.timeout_secs,
                "turtle.hint",
                None,
                self.llm.chat(&user, Some(&entry.system), &[], Some(&model)),
            )
            .await?
            .trim()
            .to_string(),
        };

        Ok(HintResponse { hint, level })
    }

    /// Validate a player's proposed solution.
    pub async fn validate(&self, solution: &str, player_answer: &str) -> Result<ValidationResponse> {
        ensure_safe(&self.guard, player_answer).await?;

        let entry = self.prompts.get("validate")?;
        let user = render_with(
            &entry.user,
            &[("solution", solution), ("player_answer", player_answer)],
        )?;
        let model = self.llm.model_for_task(Some(TaskKind::Verify)).to_string();

        let schema = json!({
            "type": "object",
            "properties": {"result": {"type": "string"}},
            "required": ["result"]
        });
        let structured = invoke_with_timeout(
            self.timeout_secs,
            "turtle.validate",
            None,
            self.llm
                .chat_structured(&user, &schema, Some(&entry.system), &[], Some(&model)),
        )
        .await
        .ok()
        .and_then(|v| v.get("result").and_then(Value::as_str).map(|s| s.to_uppercase()));

        let (verdict, raw_text) = resolve_verdict(
            &self.llm,
            VALIDATION_RESULTS,
            structured,
            &user,
            Some(&entry.system),
            Some(&model),
            Some(TaskKind::Verify),
            self.timeout_secs,
            "turtle.validate",
            None,
        )
        .await?;

        // Plain replies may be lowercase; rescan the uppercased text before
        // giving up.
        let verdict = verdict.or_else(|| scan_enum(&raw_text.to_uppercase(), VALIDATION_RESULTS));

        Ok(ValidationResponse {
            result: verdict.map(str::to_string),
            raw_text,
        })
    }

    /// Reveal the solution as a short narrative.
    pub async fn reveal(&self, scenario: &str, solution: &str) -> Result<RevealResponse> {
        let entry = self.prompts.get("reveal")?;
        let puzzle = encode_puzzle(scenario, solution, None, None);
        let user = render_with(&entry.user, &[("puzzle", puzzle.as_str())])?;

        let narrative = invoke_with_timeout(
            self.timeout_secs,
            "turtle.reveal",
            None,
            self.llm.chat(&user, Some(&entry.system), &[], None),
        )
        .await?;

        Ok(RevealResponse {
            narrative: narrative.trim().to_string(),
        })
    }
}
