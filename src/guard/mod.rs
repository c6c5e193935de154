//! Prompt-injection guard: rule packs, evaluation, caching.

mod evaluator;
pub mod rulepack;

pub use evaluator::{AnomalyScorer, GuardEvaluation, GuardMatch, InjectionGuard};

use crate::error::{GatewayError, Result};

/// Gate helper used by every text-accepting endpoint: evaluate the input
/// and fail with a guard-blocked error when it scores over the threshold.
pub async fn ensure_safe(guard: &InjectionGuard, input: &str) -> Result<()> {
    let evaluation = guard.evaluate(input).await;
    if evaluation.malicious() {
        return Err(GatewayError::GuardBlocked {
            score: evaluation.score,
            threshold: evaluation.threshold,
        });
    }
    Ok(())
}
