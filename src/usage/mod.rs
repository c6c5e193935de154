//! Token-usage tracking: in-memory metrics plus the shared daily table.

mod metrics;
mod repository;

pub use metrics::{LlmMetrics, MetricsSnapshot};
pub use repository::{DailyUsage, UsageRepository};

use std::sync::Arc;

use log::error;

use crate::llm::{UsageInfo, UsageObserver};

/// Observer wired into the LLM client: updates in-memory metrics
/// synchronously and persists the daily row in a detached task so write
/// failures never surface to callers.
pub struct UsageRecorder {
    metrics: Arc<LlmMetrics>,
    repository: Arc<UsageRepository>,
}

impl UsageRecorder {
    pub fn new(metrics: Arc<LlmMetrics>, repository: Arc<UsageRepository>) -> Self {
        Self {
            metrics,
            repository,
        }
    }
}

impl UsageObserver for UsageRecorder {
    fn on_usage(&self, usage: &UsageInfo) {
        self.metrics.record(usage);
        if usage.input_tokens == 0 && usage.output_tokens == 0 {
            return;
        }
        let repository = Arc::clone(&self.repository);
        let usage = *usage;
        tokio::spawn(async move {
            if let Err(e) = repository
                .record_usage(
                    usage.input_tokens as i64,
                    usage.output_tokens as i64,
                    usage.reasoning_tokens as i64,
                )
                .await
            {
                error!("USAGE_DB_SAVE_FAILED: {}", e);
            }
        });
    }

    fn on_error(&self) {
        self.metrics.record_error();
    }
}
