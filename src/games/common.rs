//! Shared pipeline plumbing: the uniform timeout envelope, Q/A history
//! trimming, and enum-scan parsing with one deterministic retry.

use std::future::Future;

use log::debug;

use crate::error::{GatewayError, Result};
use crate::llm::{HistoryEntry, LlmClient, TaskKind};

/// Q/A prefix convention for stored history lines.
pub const QUESTION_PREFIX: &str = "Q: ";
pub const ANSWER_PREFIX: &str = "A: ";

/// Wrap an LLM invocation in the configured hard deadline. Taxonomy errors
/// propagate unchanged; expiry cancels the call and raises a timeout
/// carrying the operation name and session id.
pub async fn invoke_with_timeout<T, F>(
    timeout_secs: u64,
    operation: &str,
    session_id: Option<&str>,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::LlmTimeout(format!(
            "{} timed out after {}s (session: {})",
            operation,
            timeout_secs,
            session_id.unwrap_or("-")
        ))),
    }
}

/// Build the recent-Q/A context block for prompt composition. Only lines
/// carrying the Q:/A: prefixes participate; the last `max_pairs` pairs are
/// kept and `max_pairs == 0` disables history context entirely.
pub fn qa_history_context(history: &[HistoryEntry], header: &str, max_pairs: usize) -> String {
    if max_pairs == 0 {
        return String::new();
    }
    let mut lines: Vec<&str> = history
        .iter()
        .map(|entry| entry.content.as_str())
        .filter(|content| content.starts_with("Q:") || content.starts_with("A:"))
        .collect();

    let max_lines = max_pairs * 2;
    if lines.len() > max_lines {
        lines = lines.split_off(lines.len() - max_lines);
    }
    if lines.is_empty() {
        return String::new();
    }
    format!("\n\n{}\n{}", header, lines.join("\n"))
}

/// Split stored history into (question, answer) pairs, stripping prefixes.
pub fn qa_pairs(history: &[HistoryEntry]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i + 1 < history.len() {
        let q = &history[i].content;
        let a = &history[i + 1].content;
        let question = q.strip_prefix(QUESTION_PREFIX).unwrap_or(q).to_string();
        let answer = a.strip_prefix(ANSWER_PREFIX).unwrap_or(a).to_string();
        pairs.push((question, answer));
        i += 2;
    }
    pairs
}

/// First enumeration member whose literal occurs in the text. Scanning in
/// enumeration order is intentional: the shorter "예" shadows "아마도 예",
/// which the bots rely on.
pub fn scan_enum(text: &str, variants: &[&'static str]) -> Option<&'static str> {
    let trimmed = text.trim();
    variants.iter().find(|v| trimmed.contains(*v)).copied()
}

/// Deterministic retry hint listing the allowed literals.
pub fn retry_hint(variants: &[&'static str]) -> String {
    format!(
        "\n\n다음 중 정확히 하나로만 답하세요: {}",
        variants.join(", ")
    )
}

/// Resolve a verdict from an optional structured attempt, falling back to
/// plain completions with at most one hinted retry.
///
/// Returns (verdict, raw text). A None verdict still surfaces the raw text
/// to the caller.
#[allow(clippy::too_many_arguments)]
pub async fn resolve_verdict(
    llm: &LlmClient,
    variants: &[&'static str],
    structured_text: Option<String>,
    prompt: &str,
    system_prompt: Option<&str>,
    model: Option<&str>,
    task: Option<TaskKind>,
    timeout_secs: u64,
    operation: &str,
    session_id: Option<&str>,
) -> Result<(Option<&'static str>, String)> {
    if let Some(text) = structured_text {
        if let Some(verdict) = scan_enum(&text, variants) {
            return Ok((Some(verdict), text));
        }
        debug!(
            "{}: structured result '{}' outside enumeration, falling back",
            operation, text
        );
    }

    let resolved_model = model
        .map(str::to_string)
        .unwrap_or_else(|| llm.model_for_task(task).to_string());

    let text = invoke_with_timeout(
        timeout_secs,
        operation,
        session_id,
        llm.chat(prompt, system_prompt, &[], Some(&resolved_model)),
    )
    .await?;
    if let Some(verdict) = scan_enum(&text, variants) {
        return Ok((Some(verdict), text));
    }

    let hinted = format!("{}{}", prompt, retry_hint(variants));
    let text = invoke_with_timeout(
        timeout_secs,
        operation,
        session_id,
        llm.chat(&hinted, system_prompt, &[], Some(&resolved_model)),
    )
    .await?;
    let verdict = scan_enum(&text, variants);
    Ok((verdict, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    fn entry(role: MessageRole, content: &str) -> HistoryEntry {
        HistoryEntry {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_scan_enum_first_occurrence_wins() {
        let variants = &["예", "아마도 예", "아마도 아니오", "아니오"];
        // "예" shadows the longer "아마도 예" by enumeration order.
        assert_eq!(scan_enum("아마도 예", variants), Some("예"));
        assert_eq!(scan_enum("아니오", variants), Some("아니오"));
        assert_eq!(scan_enum("정답은 아마도 아니오입니다", variants), Some("아마도 아니오"));
        assert_eq!(scan_enum("모르겠어요", variants), None);
    }

    #[test]
    fn test_scan_enum_empty() {
        assert_eq!(scan_enum("", &["예"]), None);
    }

    #[test]
    fn test_qa_history_context_trims_pairs() {
        let history = vec![
            entry(MessageRole::User, "Q: 질문1"),
            entry(MessageRole::Assistant, "A: 답1"),
            entry(MessageRole::User, "Q: 질문2"),
            entry(MessageRole::Assistant, "A: 답2"),
            entry(MessageRole::User, "Q: 질문3"),
            entry(MessageRole::Assistant, "A: 답3"),
        ];
        let context = qa_history_context(&history, "이전 문답:", 2);
        assert!(context.contains("질문2"));
        assert!(context.contains("질문3"));
        assert!(!context.contains("질문1"));
        assert!(context.starts_with("\n\n이전 문답:\n"));
    }

    #[test]
    fn test_qa_history_context_zero_pairs_disables() {
        let history = vec![entry(MessageRole::User, "Q: 질문")];
        assert_eq!(qa_history_context(&history, "h", 0), "");
    }

    #[test]
    fn test_qa_history_context_ignores_non_qa_lines() {
        let history = vec![
            entry(MessageRole::System, "시스템 메시지"),
            entry(MessageRole::User, "Q: 질문"),
            entry(MessageRole::Assistant, "A: 답"),
        ];
        let context = qa_history_context(&history, "h", 5);
        assert!(!context.contains("시스템"));
        assert!(context.contains("Q: 질문"));
    }

    #[test]
    fn test_qa_pairs_strips_prefixes() {
        let history = vec![
            entry(MessageRole::User, "Q: 바다인가요?"),
            entry(MessageRole::Assistant, "A: 예"),
            entry(MessageRole::User, "Q: 끝?"),
        ];
        let pairs = qa_pairs(&history);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0], ("바다인가요?".to_string(), "예".to_string()));
    }

    #[test]
    fn test_retry_hint_lists_variants() {
        let hint = retry_hint(&["정답", "근접", "오답"]);
        assert!(hint.contains("정답, 근접, 오답"));
    }

    #[tokio::test]
    async fn test_invoke_with_timeout_expiry() {
        let result: Result<()> = invoke_with_timeout(0, "answer", Some("s1"), async {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, GatewayError::LlmTimeout(_)));
        assert!(err.to_string().contains("answer"));
        assert!(err.to_string().contains("s1"));
    }

    #[tokio::test]
    async fn test_invoke_with_timeout_passthrough() {
        let result = invoke_with_timeout(5, "op", None, async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);

        let result: Result<i32> = invoke_with_timeout(5, "op", None, async {
            Err(GatewayError::LlmRateLimit("slow down".into()))
        })
        .await;
        assert!(matches!(result, Err(GatewayError::LlmRateLimit(_))));
    }
}
