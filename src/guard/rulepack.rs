//! Rule-pack loading and compilation.
//!
//! Rule packs are YAML files declaring regex and phrase rules with weights.
//! Packs compile into a regex list plus one Aho-Corasick automaton per pack
//! so phrase matching is a single linear pass.

use std::path::Path;

use aho_corasick::AhoCorasick;
use log::{error, info, warn};
use regex::{Regex, RegexBuilder};
use serde_yaml::Value;

/// A single detection rule.
#[derive(Debug, Clone)]
pub enum Rule {
    Regex {
        id: String,
        pattern: String,
        weight: f64,
    },
    Phrases {
        id: String,
        phrases: Vec<String>,
        weight: f64,
    },
}

impl Rule {
    pub fn id(&self) -> &str {
        match self {
            Rule::Regex { id, .. } | Rule::Phrases { id, .. } => id,
        }
    }
}

/// A parsed rule pack, immutable post-load.
#[derive(Debug, Clone)]
pub struct Rulepack {
    pub version: i64,
    pub threshold: f64,
    pub normalizers: Vec<String>,
    pub rules: Vec<Rule>,
}

/// One compiled regex rule.
#[derive(Debug)]
pub struct CompiledRegex {
    pub id: String,
    pub regex: Regex,
    pub weight: f64,
}

/// Compiled pack ready for evaluation.
#[derive(Debug)]
pub struct CompiledPack {
    pub threshold: f64,
    pub regexes: Vec<CompiledRegex>,
    /// Automaton over lowercased phrases; None when the pack has no phrases.
    pub automaton: Option<AhoCorasick>,
    /// Phrase strings aligned with automaton pattern ids.
    pub phrases: Vec<String>,
    /// Weights aligned with `phrases`.
    pub phrase_weights: Vec<f64>,
}

fn value_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn value_str(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Parse a single rule mapping. Returns None (after logging) on any
/// malformed definition so one bad rule never aborts the pack.
fn parse_rule(data: &Value) -> Option<Rule> {
    let mapping = data.as_mapping()?;
    let get = |key: &str| mapping.get(Value::String(key.to_string()));

    let rule_type = value_str(get("type"))?;
    let id = match value_str(get("id")) {
        Some(id) => id,
        None => {
            warn!("Rule without id skipped");
            return None;
        }
    };
    let weight = match value_f64(get("weight")) {
        Some(w) if w >= 0.0 => w,
        _ => {
            warn!("Rule {} has missing or negative weight, skipped", id);
            return None;
        }
    };

    match rule_type.as_str() {
        "regex" => {
            let pattern = match value_str(get("pattern")) {
                Some(p) => p,
                None => {
                    warn!("Regex rule {} without pattern, skipped", id);
                    return None;
                }
            };
            Some(Rule::Regex { id, pattern, weight })
        }
        "phrases" => {
            let phrases = match get("phrases").and_then(Value::as_sequence) {
                Some(seq) => seq
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect::<Vec<_>>(),
                None => {
                    warn!("Phrases rule {} without phrase list, skipped", id);
                    return None;
                }
            };
            if phrases.is_empty() {
                warn!("Phrases rule {} has no phrases, skipped", id);
                return None;
            }
            Some(Rule::Phrases { id, phrases, weight })
        }
        other => {
            warn!("Unknown rule type '{}' in rule {}, skipped", other, id);
            None
        }
    }
}

/// Parse a rule-pack document.
pub fn parse_rulepack(data: &Value) -> Option<Rulepack> {
    let mapping = data.as_mapping()?;
    let get = |key: &str| mapping.get(Value::String(key.to_string()));

    let rules = match get("rules").and_then(Value::as_sequence) {
        Some(seq) => seq.iter().filter_map(parse_rule).collect(),
        None => Vec::new(),
    };

    let normalizers = get("normalizers")
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_else(|| vec!["nfkc".to_string(), "strip_zero_width".to_string()]);

    Some(Rulepack {
        version: get("version").and_then(Value::as_i64).unwrap_or(1),
        threshold: value_f64(get("threshold")).unwrap_or(0.7),
        normalizers,
        rules,
    })
}

/// Compile a parsed pack into its evaluation structures.
pub fn compile(pack: &Rulepack) -> CompiledPack {
    let mut regexes = Vec::new();
    let mut phrases = Vec::new();
    let mut phrase_weights = Vec::new();

    for rule in &pack.rules {
        match rule {
            Rule::Regex { id, pattern, weight } => {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(regex) => regexes.push(CompiledRegex {
                        id: id.clone(),
                        regex,
                        weight: *weight,
                    }),
                    Err(e) => warn!("Invalid regex in rule {}: {}", id, e),
                }
            }
            Rule::Phrases { phrases: list, weight, .. } => {
                for phrase in list {
                    phrases.push(phrase.to_lowercase());
                    phrase_weights.push(*weight);
                }
            }
        }
    }

    let automaton = if phrases.is_empty() {
        None
    } else {
        match AhoCorasick::new(&phrases) {
            Ok(ac) => Some(ac),
            Err(e) => {
                warn!("Failed to build phrase automaton: {}", e);
                None
            }
        }
    };

    CompiledPack {
        threshold: pack.threshold,
        regexes,
        automaton,
        phrases,
        phrase_weights,
    }
}

/// Load and compile every rule pack in a directory. File-level failures are
/// logged and skipped; loading never aborts.
pub fn load_and_compile(dir: &Path) -> Vec<CompiledPack> {
    let mut compiled = Vec::new();

    for pattern in ["*.yml", "*.yaml"] {
        let glob_pattern = dir.join(pattern).to_string_lossy().to_string();
        let paths = match glob::glob(&glob_pattern) {
            Ok(paths) => paths,
            Err(e) => {
                error!("Bad rulepack glob {}: {}", glob_pattern, e);
                continue;
            }
        };
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    error!("Failed to read rulepack entry: {}", e);
                    continue;
                }
            };
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    error!("Failed to read rulepack {}: {}", path.display(), e);
                    continue;
                }
            };
            let value: Value = match serde_yaml::from_str(&content) {
                Ok(value) => value,
                Err(e) => {
                    error!("Failed to parse rulepack {}: {}", path.display(), e);
                    continue;
                }
            };
            match parse_rulepack(&value) {
                Some(pack) => {
                    info!(
                        "Loaded rulepack: {} ({} rules)",
                        path.file_name().unwrap_or_default().to_string_lossy(),
                        pack.rules.len()
                    );
                    compiled.push(compile(&pack));
                }
                None => error!("Rulepack {} is not a mapping", path.display()),
            }
        }
    }

    compiled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(yaml: &str) -> Rulepack {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        parse_rulepack(&value).unwrap()
    }

    #[test]
    fn test_parse_regex_and_phrases() {
        let pack = parse(
            r#"
version: 2
threshold: 0.8
rules:
  - type: regex
    id: dangerous_pattern
    pattern: "ignore.*instructions"
    weight: 0.5
  - type: phrases
    id: leak_phrases
    weight: 0.4
    phrases: ["System Prompt", "api key"]
"#,
        );
        assert_eq!(pack.version, 2);
        assert_eq!(pack.threshold, 0.8);
        assert_eq!(pack.rules.len(), 2);
        assert_eq!(pack.rules[0].id(), "dangerous_pattern");
    }

    #[test]
    fn test_malformed_rule_skipped() {
        let pack = parse(
            r#"
threshold: 0.7
rules:
  - type: regex
    id: ok_rule
    pattern: "x"
    weight: 0.1
  - type: regex
    id: no_pattern
    weight: 0.1
  - type: phrases
    id: no_phrases
    weight: 0.1
  - type: mystery
    id: unknown_type
    weight: 0.1
"#,
        );
        assert_eq!(pack.rules.len(), 1);
        assert_eq!(pack.rules[0].id(), "ok_rule");
    }

    #[test]
    fn test_negative_weight_skipped() {
        let pack = parse(
            r#"
rules:
  - type: regex
    id: negative
    pattern: "x"
    weight: -1.0
"#,
        );
        assert!(pack.rules.is_empty());
    }

    #[test]
    fn test_defaults() {
        let pack = parse("rules: []");
        assert_eq!(pack.version, 1);
        assert_eq!(pack.threshold, 0.7);
        assert_eq!(pack.normalizers, vec!["nfkc", "strip_zero_width"]);
    }

    #[test]
    fn test_compile_skips_invalid_regex() {
        let pack = parse(
            r#"
rules:
  - type: regex
    id: broken
    pattern: "(unclosed"
    weight: 0.5
  - type: regex
    id: fine
    pattern: "abc"
    weight: 0.5
"#,
        );
        let compiled = compile(&pack);
        assert_eq!(compiled.regexes.len(), 1);
        assert_eq!(compiled.regexes[0].id, "fine");
    }

    #[test]
    fn test_compile_lowercases_phrases() {
        let pack = parse(
            r#"
rules:
  - type: phrases
    id: p
    weight: 0.3
    phrases: ["System Prompt"]
"#,
        );
        let compiled = compile(&pack);
        assert_eq!(compiled.phrases, vec!["system prompt"]);
        assert_eq!(compiled.phrase_weights, vec![0.3]);
        assert!(compiled.automaton.is_some());
    }

    #[test]
    fn test_regex_case_insensitive() {
        let pack = parse(
            r#"
rules:
  - type: regex
    id: ci
    pattern: "ignore"
    weight: 0.5
"#,
        );
        let compiled = compile(&pack);
        assert!(compiled.regexes[0].regex.is_match("IGNORE this"));
    }

    #[test]
    fn test_load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.yml");
        let bad = dir.path().join("bad.yml");
        std::fs::File::create(&good)
            .unwrap()
            .write_all(b"threshold: 0.5\nrules:\n  - type: regex\n    id: r\n    pattern: x\n    weight: 0.1\n")
            .unwrap();
        std::fs::File::create(&bad)
            .unwrap()
            .write_all(b"{{{ not yaml")
            .unwrap();

        let packs = load_and_compile(dir.path());
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].threshold, 0.5);
    }
}
