//! Anomaly scoring over morphological tokens.
//!
//! Four independent signals, summed and clamped to [0, 1] by the caller:
//! unknown-token ratio, average token length, incomplete-Hangul presence,
//! and content-word ratio.

use std::sync::OnceLock;

use regex::Regex;

use crate::nlp::NlpToken;

pub const MIN_TEXT_LENGTH: usize = 3;
pub const FALLBACK_SCORE: f64 = 0.5;
pub const EMPTY_TOKEN_SCORE: f64 = 0.8;

const UNKNOWN_RATIO_HIGH: f64 = 0.6;
const UNKNOWN_RATIO_MEDIUM: f64 = 0.4;
const UNKNOWN_RATIO_LOW: f64 = 0.2;

const UNKNOWN_SCORE_HIGH: f64 = 0.4;
const UNKNOWN_SCORE_MEDIUM: f64 = 0.3;
const UNKNOWN_SCORE_LOW: f64 = 0.1;

const TOKEN_LENGTH_LOW: f64 = 0.6;
const TOKEN_LENGTH_MEDIUM: f64 = 0.8;
const TOKEN_LENGTH_HIGH: f64 = 1.0;

const TOKEN_LENGTH_SCORE_HIGH: f64 = 0.3;
const TOKEN_LENGTH_SCORE_MEDIUM: f64 = 0.2;
const TOKEN_LENGTH_SCORE_LOW: f64 = 0.1;

const HANGUL_RATIO_LOW: f64 = 0.2;
const HANGUL_RATIO_MEDIUM: f64 = 0.4;

const HANGUL_SCORE_MEDIUM: f64 = 0.2;
const HANGUL_SCORE_LOW: f64 = 0.1;

const CONTENT_RATIO_THRESHOLD: f64 = 0.15;
const MIN_TOKENS_FOR_CONTENT_CHECK: usize = 3;

fn incomplete_hangul_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\u{3131}-\u{314E}\u{314F}-\u{3163}]{2,}").expect("static regex"))
}

fn emoticon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ㅋㅎ]{2,}").expect("static regex"))
}

fn is_unknown_tag(tag: &str) -> bool {
    tag == "UN" || tag.starts_with("UNK")
}

fn is_content_tag(tag: &str) -> bool {
    tag.starts_with("NN") || tag.starts_with("VV") || tag.starts_with("VA") || tag == "NR"
}

/// Score by the fraction of unknown-tagged tokens.
pub fn score_unknown_tokens(tokens: &[NlpToken]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let unknown = tokens.iter().filter(|t| is_unknown_tag(&t.tag)).count();
    let ratio = unknown as f64 / tokens.len() as f64;
    if ratio > UNKNOWN_RATIO_HIGH {
        UNKNOWN_SCORE_HIGH
    } else if ratio > UNKNOWN_RATIO_MEDIUM {
        UNKNOWN_SCORE_MEDIUM
    } else if ratio > UNKNOWN_RATIO_LOW {
        UNKNOWN_SCORE_LOW
    } else {
        0.0
    }
}

/// Score by average token length; shorter tokens are more suspicious.
pub fn score_token_length(tokens: &[NlpToken]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let total: usize = tokens.iter().map(|t| t.length).sum();
    let avg = total as f64 / tokens.len() as f64;
    if avg < TOKEN_LENGTH_LOW {
        TOKEN_LENGTH_SCORE_HIGH
    } else if avg < TOKEN_LENGTH_MEDIUM {
        TOKEN_LENGTH_SCORE_MEDIUM
    } else if avg < TOKEN_LENGTH_HIGH {
        TOKEN_LENGTH_SCORE_LOW
    } else {
        0.0
    }
}

/// Score by standalone-jamo presence, modulated by the composed-Hangul
/// ratio of the whole text. Laugh patterns (ㅋㅋ/ㅎㅎ) are excluded.
pub fn score_incomplete_hangul(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let total = text.chars().count();
    let hangul = text.chars().filter(|c| ('가'..='힣').contains(c)).count();
    let hangul_ratio = hangul as f64 / total as f64;

    let has_incomplete = incomplete_hangul_re().is_match(text);
    let is_emoticon = emoticon_re().is_match(text);

    if has_incomplete && !is_emoticon {
        if hangul_ratio < HANGUL_RATIO_LOW {
            return HANGUL_SCORE_MEDIUM;
        }
        if hangul_ratio < HANGUL_RATIO_MEDIUM {
            return HANGUL_SCORE_LOW;
        }
    }
    0.0
}

/// Score by content-word ratio; low ratios are suspicious.
pub fn score_content_ratio(tokens: &[NlpToken]) -> f64 {
    if tokens.len() <= MIN_TOKENS_FOR_CONTENT_CHECK {
        return 0.0;
    }
    let content = tokens.iter().filter(|t| is_content_tag(&t.tag)).count();
    let ratio = content as f64 / tokens.len() as f64;
    if ratio < CONTENT_RATIO_THRESHOLD {
        CONTENT_RATIO_THRESHOLD
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(form: &str, tag: &str) -> NlpToken {
        NlpToken {
            form: form.to_string(),
            tag: tag.to_string(),
            position: 0,
            length: form.chars().count(),
        }
    }

    #[test]
    fn test_unknown_ratio_thresholds() {
        let mk = |unknown: usize, known: usize| {
            let mut tokens = Vec::new();
            for _ in 0..unknown {
                tokens.push(tok("ㅁㄴ", "UN"));
            }
            for _ in 0..known {
                tokens.push(tok("말", "NNG"));
            }
            tokens
        };
        assert_eq!(score_unknown_tokens(&mk(7, 3)), 0.4); // 0.7 > 0.6
        assert_eq!(score_unknown_tokens(&mk(5, 5)), 0.3); // 0.5 > 0.4
        assert_eq!(score_unknown_tokens(&mk(3, 7)), 0.1); // 0.3 > 0.2
        assert_eq!(score_unknown_tokens(&mk(1, 9)), 0.0);
        assert_eq!(score_unknown_tokens(&[]), 0.0);
    }

    #[test]
    fn test_token_length_thresholds() {
        let ones = vec![tok("a", "SL"), tok("b", "SL")];
        // avg 1.0 -> no score
        assert_eq!(score_token_length(&ones), 0.0);

        let mixed = vec![tok("", "SL"), tok("ab", "SL")];
        // avg 1.0 exactly -> still no score
        assert_eq!(score_token_length(&mixed), 0.0);

        let short = vec![tok("", "SL"), tok("a", "SL")];
        // avg 0.5 -> high
        assert_eq!(score_token_length(&short), 0.3);
    }

    #[test]
    fn test_incomplete_hangul_excludes_laughs() {
        assert_eq!(score_incomplete_hangul("ㅋㅋㅋ 진짜 웃기다"), 0.0);
        assert!(score_incomplete_hangul("ㅁㄴㅇㄹ asdf") > 0.0);
    }

    #[test]
    fn test_incomplete_hangul_ratio_modulation() {
        // No composed hangul at all: medium score.
        assert_eq!(score_incomplete_hangul("ㅁㄴㅇㄹ 1234"), 0.2);
        // Some composed hangul (ratio between 0.2 and 0.4): low score.
        assert_eq!(score_incomplete_hangul("한글이 ㅁㄴ asdf"), 0.1);
    }

    #[test]
    fn test_content_ratio() {
        let mostly_symbols = vec![
            tok("!", "SF"),
            tok("?", "SF"),
            tok(".", "SF"),
            tok(",", "SF"),
            tok(";", "SF"),
            tok(":", "SF"),
            tok("-", "SF"),
        ];
        assert_eq!(score_content_ratio(&mostly_symbols), 0.15);

        let with_nouns = vec![
            tok("말", "NNG"),
            tok("은", "JX"),
            tok("동물", "NNG"),
            tok("이", "JX"),
        ];
        assert_eq!(score_content_ratio(&with_nouns), 0.0);

        // At or below the minimum token count the check is skipped.
        assert_eq!(score_content_ratio(&mostly_symbols[..3]), 0.0);
    }
}
