//! Score-based prompt-injection detection.
//!
//! Evaluation layers, in order: jamo-only check, emoji check, normalized
//! rule-pack scan (regex + phrase automaton), optional morphological
//! anomaly contribution. Results are cached with a TTL, and concurrent
//! evaluations of the same input share a single in-flight computation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::{debug, warn};
use tokio::sync::Mutex;

use crate::config::GuardSettings;
use crate::error::Result;
use crate::guard::rulepack::{CompiledPack, load_and_compile};
use crate::text::{DEFAULT_NORMALIZERS, normalize_text};
use crate::unicode::{contains_emoji, is_jamo_only};

/// Default verdict threshold when neither config nor packs provide one.
const DEFAULT_MALICIOUS_THRESHOLD: f64 = 0.7;

/// Minimum input length before the anomaly scorer runs.
const MIN_ANOMALY_INPUT_CHARS: usize = 3;

/// A single rule match.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardMatch {
    pub id: String,
    pub weight: f64,
}

/// Result of a guard evaluation. Immutable value.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardEvaluation {
    pub score: f64,
    pub hits: Vec<GuardMatch>,
    pub threshold: f64,
}

impl GuardEvaluation {
    pub fn malicious(&self) -> bool {
        self.score >= self.threshold
    }

    fn clean(threshold: f64) -> Self {
        Self {
            score: 0.0,
            hits: Vec::new(),
            threshold,
        }
    }

    fn synthetic(rule_id: &str, threshold: f64) -> Self {
        Self {
            score: threshold,
            hits: vec![GuardMatch {
                id: rule_id.to_string(),
                weight: threshold,
            }],
            threshold,
        }
    }
}

/// Morphological anomaly scorer installed into the guard.
#[async_trait]
pub trait AnomalyScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<f64>;
}

type SharedEvaluation = Shared<BoxFuture<'static, GuardEvaluation>>;

struct GuardInner {
    settings: GuardSettings,
    compiled: Vec<CompiledPack>,
    anomaly: Option<Arc<dyn AnomalyScorer>>,
    cache: moka::future::Cache<String, GuardEvaluation>,
    inflight: Mutex<HashMap<String, SharedEvaluation>>,
}

/// Score-based prompt-injection guard.
#[derive(Clone)]
pub struct InjectionGuard {
    inner: Arc<GuardInner>,
}

impl InjectionGuard {
    /// Build the guard, compiling rule packs when enabled.
    pub fn new(settings: GuardSettings, anomaly: Option<Arc<dyn AnomalyScorer>>) -> Self {
        let compiled = if settings.enabled {
            let dir = Path::new(&settings.rulepacks_dir);
            let mut packs = load_and_compile(dir);
            // Fall back to the bundled packs when the configured directory
            // is empty.
            if packs.is_empty() && settings.rulepacks_dir != "rulepacks" {
                packs = load_and_compile(Path::new("rulepacks"));
            }
            if packs.is_empty() {
                warn!(
                    "No rulepacks loaded from {} (guard runs on built-in checks only)",
                    settings.rulepacks_dir
                );
            } else {
                log::info!(
                    "InjectionGuard initialized: packs={}, threshold={:.2}",
                    packs.len(),
                    settings.threshold
                );
            }
            packs
        } else {
            Vec::new()
        };

        let cache = moka::future::Cache::builder()
            .max_capacity(settings.cache_maxsize)
            .time_to_live(Duration::from_secs(settings.cache_ttl_secs))
            .build();

        Self {
            inner: Arc::new(GuardInner {
                settings,
                compiled,
                anomaly,
                cache,
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Evaluate input for potential injection attacks.
    ///
    /// Concurrent callers with the same input share one computation; the
    /// computation itself is spawned so it survives caller cancellation.
    pub async fn evaluate(&self, input: &str) -> GuardEvaluation {
        if !self.inner.settings.enabled {
            return GuardEvaluation::clean(f64::INFINITY);
        }

        if let Some(cached) = self.inner.cache.get(input).await {
            return cached;
        }

        let shared = {
            let mut inflight = self.inner.inflight.lock().await;
            if let Some(cached) = self.inner.cache.get(input).await {
                return cached;
            }
            match inflight.get(input) {
                Some(existing) => existing.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let key = input.to_string();
                    let handle = tokio::spawn(async move { inner.evaluate_and_cache(key).await });
                    let shared: SharedEvaluation = handle
                        .map(|joined| {
                            joined.unwrap_or_else(|e| {
                                warn!("Guard evaluation task failed: {}", e);
                                GuardEvaluation::clean(DEFAULT_MALICIOUS_THRESHOLD)
                            })
                        })
                        .boxed()
                        .shared();
                    inflight.insert(input.to_string(), shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    /// Convenience verdict.
    pub async fn is_malicious(&self, input: &str) -> bool {
        self.evaluate(input).await.malicious()
    }

    /// Number of loaded packs (for health reporting).
    pub fn pack_count(&self) -> usize {
        self.inner.compiled.len()
    }

    pub fn enabled(&self) -> bool {
        self.inner.settings.enabled
    }
}

impl GuardInner {
    async fn evaluate_and_cache(self: Arc<Self>, input: String) -> GuardEvaluation {
        let result = self.evaluate_internal(&input).await;
        self.cache.insert(input.clone(), result.clone()).await;
        let mut inflight = self.inflight.lock().await;
        inflight.remove(&input);
        result
    }

    async fn evaluate_internal(self: &Arc<Self>, input: &str) -> GuardEvaluation {
        let threshold = self.effective_threshold();

        // Jamo-only input is a known Korean attack vector.
        if is_jamo_only(input) {
            warn!("GUARD_JAMO_ONLY_BLOCK input={:.50}", input);
            return GuardEvaluation::synthetic("jamo_only", threshold);
        }

        if contains_emoji(input) {
            warn!("GUARD_EMOJI_BLOCK input={:.50}", input);
            return GuardEvaluation::synthetic("emoji_detected", threshold);
        }

        let normalized = normalize_text(input, DEFAULT_NORMALIZERS);

        // Regex and automaton scans are CPU-bound.
        let inner = Arc::clone(self);
        let scan_input = normalized.clone();
        let (base_score, mut hits) =
            tokio::task::spawn_blocking(move || inner.evaluate_packs(&scan_input))
                .await
                .unwrap_or_else(|e| {
                    warn!("Pack scan task failed: {}", e);
                    (0.0, Vec::new())
                });

        let anomaly_score = self.compute_anomaly(input).await;
        if anomaly_score > self.settings.anomaly_threshold {
            debug!(
                "GUARD_ANOMALY score={:.2} input={:.30}",
                anomaly_score, input
            );
            hits.push(GuardMatch {
                id: "morphological_anomaly".to_string(),
                weight: anomaly_score,
            });
        }

        GuardEvaluation {
            score: base_score + anomaly_score,
            hits,
            threshold,
        }
    }

    fn effective_threshold(&self) -> f64 {
        if self.settings.threshold > 0.0 {
            return self.settings.threshold;
        }
        if self.compiled.is_empty() {
            return DEFAULT_MALICIOUS_THRESHOLD;
        }
        self.compiled
            .iter()
            .map(|p| p.threshold)
            .fold(f64::MIN, f64::max)
    }

    fn evaluate_packs(&self, text: &str) -> (f64, Vec<GuardMatch>) {
        let mut total = 0.0;
        let mut hits = Vec::new();
        let text_lower = text.to_lowercase();

        for pack in &self.compiled {
            for rule in &pack.regexes {
                if rule.regex.is_match(text) {
                    total += rule.weight;
                    hits.push(GuardMatch {
                        id: rule.id.clone(),
                        weight: rule.weight,
                    });
                }
            }

            if let Some(automaton) = &pack.automaton {
                for found in automaton.find_overlapping_iter(&text_lower) {
                    let idx = found.pattern().as_usize();
                    let weight = pack.phrase_weights[idx];
                    if weight > 0.0 {
                        total += weight;
                        hits.push(GuardMatch {
                            id: format!("phrase:{}", pack.phrases[idx]),
                            weight,
                        });
                    }
                }
            }
        }

        (total, hits)
    }

    async fn compute_anomaly(&self, input: &str) -> f64 {
        let Some(scorer) = &self.anomaly else {
            return 0.0;
        };
        if input.chars().count() < MIN_ANOMALY_INPUT_CHARS {
            return 0.0;
        }
        match scorer.score(input).await {
            Ok(score) => score,
            Err(e) => {
                // Graceful degradation: a broken scorer contributes zero.
                warn!("Anomaly detection failed: {}", e);
                0.0
            }
        }
    }
}
