//! Korean morphological analysis.
//!
//! Provides tokenization, an anomaly score used by the injection guard, and
//! heuristic flags used for answer validation. The analyzer is built lazily
//! on first use; tokenization and scoring are CPU-bound and run on the
//! blocking pool when called through the async wrappers.

mod anomaly;
mod tokenizer;

pub use tokenizer::{BOUNDARY_WORDS, COMPARISON_WORDS, UNIT_NOUNS};

use std::sync::{Arc, OnceLock};

use log::{error, info, warn};

use tokenizer::Tokenizer;

/// Morphological analysis result token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NlpToken {
    /// Surface form
    pub form: String,
    /// POS tag (NNG, NR, EF, JX, UN, SL, SN, SF)
    pub tag: String,
    /// Start position in chars
    pub position: usize,
    /// Length in chars
    pub length: usize,
}

/// Heuristic analysis results for answer validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NlpHeuristics {
    /// Numeral word present (NR)
    pub numeric_quantifier: bool,
    /// Unit noun present
    pub unit_noun: bool,
    /// Boundary reference present
    pub boundary_ref: bool,
    /// Comparison word present
    pub comparison_word: bool,
}

/// Korean morphological analysis service.
///
/// The underlying tokenizer is initialized once on first use; concurrent
/// first callers observe a single initialization.
pub struct KoreanNlp {
    tokenizer: OnceLock<Tokenizer>,
}

impl Default for KoreanNlp {
    fn default() -> Self {
        Self::new()
    }
}

impl KoreanNlp {
    pub fn new() -> Self {
        Self {
            tokenizer: OnceLock::new(),
        }
    }

    fn get_tokenizer(&self) -> &Tokenizer {
        self.tokenizer.get_or_init(|| {
            info!("Initializing Korean tokenizer");
            Tokenizer::new()
        })
    }

    /// Perform morphological analysis.
    pub fn analyze(&self, text: &str) -> Vec<NlpToken> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.get_tokenizer().tokenize(text)
    }

    /// Calculate the anomaly score for input text, in [0.0, 1.0].
    ///
    /// Higher scores indicate a higher likelihood of an injection attempt.
    pub fn anomaly_score(&self, text: &str) -> f64 {
        if text.chars().count() < anomaly::MIN_TEXT_LENGTH {
            return 0.0;
        }

        let tokens = self.analyze(text);
        if tokens.is_empty() {
            warn!("anomaly_score: no tokens for non-empty text");
            return anomaly::EMPTY_TOKEN_SCORE;
        }

        let score = anomaly::score_unknown_tokens(&tokens)
            + anomaly::score_token_length(&tokens)
            + anomaly::score_incomplete_hangul(text)
            + anomaly::score_content_ratio(&tokens);

        score.clamp(0.0, 1.0)
    }

    /// Analyze text for answer-validation heuristics.
    pub fn heuristics(&self, text: &str) -> NlpHeuristics {
        let tokens = self.analyze(text);
        if tokens.is_empty() {
            return NlpHeuristics::default();
        }

        let numeric_quantifier = tokens.iter().any(|t| t.tag == "NR");
        let has_form =
            |words: &[&str]| tokens.iter().any(|t| words.iter().any(|w| t.form == *w));

        NlpHeuristics {
            numeric_quantifier,
            unit_noun: has_form(UNIT_NOUNS),
            boundary_ref: has_form(BOUNDARY_WORDS),
            comparison_word: has_form(COMPARISON_WORDS),
        }
    }

    /// Async wrapper offloading tokenization to the blocking pool.
    pub async fn analyze_async(self: &Arc<Self>, text: String) -> Vec<NlpToken> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.analyze(&text))
            .await
            .unwrap_or_else(|e| {
                error!("analyze task failed: {}", e);
                Vec::new()
            })
    }

    /// Async wrapper for anomaly scoring.
    pub async fn anomaly_score_async(self: &Arc<Self>, text: String) -> f64 {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.anomaly_score(&text))
            .await
            .unwrap_or_else(|e| {
                error!("anomaly task failed: {}", e);
                anomaly::FALLBACK_SCORE
            })
    }

    /// Async wrapper for heuristic analysis.
    pub async fn heuristics_async(self: &Arc<Self>, text: String) -> NlpHeuristics {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.heuristics(&text))
            .await
            .unwrap_or_else(|e| {
                error!("heuristics task failed: {}", e);
                NlpHeuristics::default()
            })
    }
}

/// Adapter installing the NLP service as the guard's anomaly scorer.
pub struct NlpAnomalyScorer(pub Arc<KoreanNlp>);

#[async_trait::async_trait]
impl crate::guard::AnomalyScorer for NlpAnomalyScorer {
    async fn score(&self, text: &str) -> crate::error::Result<f64> {
        Ok(self.0.anomaly_score_async(text.to_string()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> KoreanNlp {
        KoreanNlp::new()
    }

    #[test]
    fn test_analyze_empty() {
        assert!(service().analyze("").is_empty());
        assert!(service().analyze("   ").is_empty());
    }

    #[test]
    fn test_analyze_question_splits_ending() {
        let tokens = service().analyze("전자기기인가요?");
        let forms: Vec<&str> = tokens.iter().map(|t| t.form.as_str()).collect();
        assert!(forms.contains(&"전자기기"));
        assert!(forms.contains(&"인가요"));
    }

    #[test]
    fn test_anomaly_short_text_is_zero() {
        assert_eq!(service().anomaly_score("ㄱㄴ"), 0.0);
        assert_eq!(service().anomaly_score("ab"), 0.0);
    }

    #[test]
    fn test_anomaly_normal_question_is_low() {
        let score = service().anomaly_score("손에 들 수 있나요?");
        assert!(score < 0.5, "score was {score}");
    }

    #[test]
    fn test_anomaly_jamo_gibberish_is_high() {
        let score = service().anomaly_score("ㅁㄴㅇㄹ ㅂㅈㄷㄱ ㅅㅛㅕㅑ");
        assert!(score >= 0.5, "score was {score}");
    }

    #[test]
    fn test_anomaly_in_unit_range() {
        for text in ["안녕하세요", "!!!???...", "asdf qwer zxcv", "3글자 이상인가요"] {
            let score = service().anomaly_score(text);
            assert!((0.0..=1.0).contains(&score), "{text} -> {score}");
        }
    }

    #[test]
    fn test_heuristics_unit_noun() {
        let h = service().heuristics("3글자 이상인가요?");
        assert!(h.unit_noun);
        assert!(h.comparison_word);
    }

    #[test]
    fn test_heuristics_boundary() {
        let h = service().heuristics("첫 글자가 초성 ㄱ인가요?");
        assert!(h.boundary_ref);
    }

    #[test]
    fn test_heuristics_numeric() {
        let h = service().heuristics("다리가 두 개인가요?");
        assert!(h.numeric_quantifier);
        assert!(h.unit_noun);
    }

    #[test]
    fn test_heuristics_plain_question() {
        let h = service().heuristics("동물인가요?");
        assert!(!h.unit_noun);
        assert!(!h.boundary_ref);
        assert!(!h.comparison_word);
    }
}
