//! Lexicon and character-class based Korean tokenizer.
//!
//! Splits text into class runs (syllables, jamo, latin, digits,
//! punctuation), then separates predicate endings and particles from Hangul
//! runs via closed suffix lists. Tags follow the usual Korean POS
//! conventions: NNG (noun), VV (predicate stem), NR (numeral), EF (ending),
//! JX (particle), UN (unknown), SL (latin), SN (number), SF (punctuation).

use crate::nlp::NlpToken;
use crate::unicode::{is_hangul_syllable, is_jamo};

/// Unit nouns recognized for answer-validation heuristics.
pub const UNIT_NOUNS: &[&str] = &[
    "글자", "자", "음절", "문자", "토큰", "개", "번", "번째", "회", "차례", "모음", "자음",
    "초성", "중성", "종성", "받침",
];

/// Boundary-reference words.
pub const BOUNDARY_WORDS: &[&str] = &[
    "처음", "끝", "마지막", "시작", "중간", "가운데", "초성", "중성", "종성", "받침",
];

/// Comparison words.
pub const COMPARISON_WORDS: &[&str] = &["이상", "이하", "초과", "미만", "넘", "이내"];

/// Sentence-final predicate endings, longest first.
const PREDICATE_ENDINGS: &[&str] = &[
    "입니까", "인가요", "일까요", "습니까", "합니까", "인가", "이에요", "예요", "에요", "나요",
    "까요", "네요", "어요", "아요", "해요", "요", "다", "까", "니",
];

/// Postpositional particles, longest first.
const PARTICLES: &[&str] = &[
    "에서", "으로", "부터", "까지", "처럼", "보다", "에게", "한테", "은", "는", "이", "가",
    "을", "를", "에", "도", "만", "의", "와", "과", "로",
];

/// Native Korean numeral words.
const NUMERALS: &[&str] = &[
    "하나", "둘", "셋", "넷", "다섯", "여섯", "일곱", "여덟", "아홉", "열", "스물", "서른",
    "마흔", "쉰", "백", "천", "만", "억", "한", "두", "세", "네",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Syllable,
    Jamo,
    Latin,
    Digit,
    Punct,
    Space,
    Other,
}

fn classify(c: char) -> CharClass {
    if c.is_whitespace() {
        CharClass::Space
    } else if is_hangul_syllable(c) {
        CharClass::Syllable
    } else if is_jamo(c) {
        CharClass::Jamo
    } else if c.is_ascii_alphabetic() {
        CharClass::Latin
    } else if c.is_ascii_digit() {
        CharClass::Digit
    } else if c.is_ascii_punctuation() {
        CharClass::Punct
    } else {
        CharClass::Other
    }
}

pub struct Tokenizer {
    numerals: Vec<&'static str>,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            numerals: NUMERALS.to_vec(),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<NlpToken> {
        let mut tokens = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let class = classify(chars[i]);
            let start = i;
            while i < chars.len() && classify(chars[i]) == class {
                i += 1;
            }
            let run: String = chars[start..i].iter().collect();

            match class {
                CharClass::Space => {}
                CharClass::Syllable => self.emit_hangul_run(&run, start, &mut tokens),
                CharClass::Jamo | CharClass::Other => {
                    tokens.push(token(&run, "UN", start));
                }
                CharClass::Latin => tokens.push(token(&run, "SL", start)),
                CharClass::Digit => tokens.push(token(&run, "SN", start)),
                CharClass::Punct => tokens.push(token(&run, "SF", start)),
            }
        }

        tokens
    }

    /// Split a composed-Hangul run into stem + ending/particle tokens.
    /// A stem carrying a predicate-final ending tags VV; particle-bearing
    /// and bare stems tag NNG. Numeral words tag NR either way.
    fn emit_hangul_run(&self, run: &str, start: usize, tokens: &mut Vec<NlpToken>) {
        for &ending in PREDICATE_ENDINGS {
            if let Some(stem) = run.strip_suffix(ending) {
                if !stem.is_empty() {
                    let stem_len = stem.chars().count();
                    let tag = if self.is_numeral(stem) { "NR" } else { "VV" };
                    tokens.push(token(stem, tag, start));
                    tokens.push(token(ending, "EF", start + stem_len));
                    return;
                }
            }
        }
        for &particle in PARTICLES {
            if let Some(stem) = run.strip_suffix(particle) {
                if !stem.is_empty() {
                    let stem_len = stem.chars().count();
                    tokens.push(token(stem, self.stem_tag(stem), start));
                    tokens.push(token(particle, "JX", start + stem_len));
                    return;
                }
            }
        }
        tokens.push(token(run, self.stem_tag(run), start));
    }

    fn is_numeral(&self, stem: &str) -> bool {
        self.numerals.iter().any(|n| *n == stem)
    }

    fn stem_tag(&self, stem: &str) -> &'static str {
        if self.is_numeral(stem) { "NR" } else { "NNG" }
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

fn token(form: &str, tag: &str, position: usize) -> NlpToken {
    NlpToken {
        form: form.to_string(),
        tag: tag.to_string(),
        position,
        length: form.chars().count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forms(text: &str) -> Vec<String> {
        Tokenizer::new()
            .tokenize(text)
            .into_iter()
            .map(|t| t.form)
            .collect()
    }

    #[test]
    fn test_particle_split() {
        let tokens = Tokenizer::new().tokenize("글자가");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].form, "글자");
        assert_eq!(tokens[0].tag, "NNG");
        assert_eq!(tokens[1].form, "가");
        assert_eq!(tokens[1].tag, "JX");
    }

    #[test]
    fn test_predicate_ending_split() {
        let tokens = Tokenizer::new().tokenize("전자기기인가요");
        assert_eq!(tokens[0].form, "전자기기");
        assert_eq!(tokens[0].tag, "VV");
        assert_eq!(tokens[1].form, "인가요");
        assert_eq!(tokens[1].tag, "EF");
    }

    #[test]
    fn test_predicate_stem_tagged_vv() {
        let tokens = Tokenizer::new().tokenize("있나요");
        assert_eq!(tokens[0].form, "있");
        assert_eq!(tokens[0].tag, "VV");
        assert_eq!(tokens[1].form, "나요");
        assert_eq!(tokens[1].tag, "EF");
    }

    #[test]
    fn test_numeral_stem_keeps_nr_before_ending() {
        // Numeral lookup wins over the predicate-stem tag.
        let tokens = Tokenizer::new().tokenize("둘이에요");
        assert_eq!(tokens[0].form, "둘");
        assert_eq!(tokens[0].tag, "NR");
        assert_eq!(tokens[1].form, "이에요");
        assert_eq!(tokens[1].tag, "EF");
    }

    #[test]
    fn test_positions_and_lengths() {
        let tokens = Tokenizer::new().tokenize("손에 들");
        // 손(0) 에(1) 들(3)
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 1);
        assert_eq!(tokens[2].position, 3);
        assert!(tokens.iter().all(|t| t.length == 1));
    }

    #[test]
    fn test_jamo_run_is_unknown() {
        let tokens = Tokenizer::new().tokenize("ㅁㄴㅇㄹ");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].tag, "UN");
        assert_eq!(tokens[0].length, 4);
    }

    #[test]
    fn test_mixed_classes() {
        let tokens = Tokenizer::new().tokenize("abc 123 가나!");
        let tags: Vec<&str> = tokens.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(tags, vec!["SL", "SN", "NNG", "SF"]);
    }

    #[test]
    fn test_numeral_tag() {
        let tokens = Tokenizer::new().tokenize("두");
        assert_eq!(tokens[0].tag, "NR");
    }

    #[test]
    fn test_whole_run_kept_when_no_suffix_matches() {
        assert_eq!(forms("동물"), vec!["동물"]);
    }

    #[test]
    fn test_ending_never_leaves_empty_stem() {
        // The run equals an ending; it must survive as one token.
        let tokens = Tokenizer::new().tokenize("인가요");
        assert!(!tokens.is_empty());
        assert!(tokens.iter().all(|t| !t.form.is_empty()));
    }
}
