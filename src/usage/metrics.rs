//! In-memory LLM metrics since process start.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::llm::UsageInfo;

/// Lock-free cumulative counters.
#[derive(Debug, Default)]
pub struct LlmMetrics {
    calls: AtomicU64,
    errors: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    reasoning_tokens: AtomicU64,
}

/// Snapshot for the metrics endpoint.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub total_errors: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_reasoning_tokens: u64,
    pub total_tokens: u64,
}

impl LlmMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: &UsageInfo) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens.fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.output_tokens.fetch_add(usage.output_tokens, Ordering::Relaxed);
        self.reasoning_tokens
            .fetch_add(usage.reasoning_tokens, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let input = self.input_tokens.load(Ordering::Relaxed);
        let output = self.output_tokens.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_calls: self.calls.load(Ordering::Relaxed),
            total_errors: self.errors.load(Ordering::Relaxed),
            total_input_tokens: input,
            total_output_tokens: output,
            total_reasoning_tokens: self.reasoning_tokens.load(Ordering::Relaxed),
            total_tokens: input + output,
        }
    }
}
