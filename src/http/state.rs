//! Composition root shared by all handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::games::{TurtlePipeline, TwentyQPipeline};
use crate::guard::InjectionGuard;
use crate::llm::LlmClient;
use crate::nlp::KoreanNlp;
use crate::session::SessionManager;
use crate::usage::{LlmMetrics, UsageRepository};

/// Shared application state. Everything is constructed once at startup and
/// handed to the router; there are no module-level singletons.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub guard: Arc<InjectionGuard>,
    pub nlp: Arc<KoreanNlp>,
    pub llm: Arc<LlmClient>,
    pub sessions: Arc<SessionManager>,
    pub metrics: Arc<LlmMetrics>,
    pub usage: Arc<UsageRepository>,
    pub twentyq: Arc<TwentyQPipeline>,
    pub turtle: Arc<TurtlePipeline>,
    pub started_at: Instant,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
