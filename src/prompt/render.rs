//! Prompt template rendering.
//!
//! Templates use `{name}` placeholders; literal braces are written doubled
//! (`{{`, `}}`) so rendering is idempotent for templates that embed JSON
//! examples.

use std::collections::HashMap;

use crate::error::{GatewayError, Result};

/// Render a template with the given variables.
///
/// Unknown placeholders are an error; doubled braces emit one literal
/// brace.
pub fn render(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(GatewayError::Internal(format!(
                        "Unclosed placeholder '{{{}' in template",
                        name
                    )));
                }
                match vars.get(&name) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(GatewayError::Internal(format!(
                            "Unknown placeholder '{{{}}}' in template",
                            name
                        )));
                    }
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(GatewayError::Internal(
                        "Stray '}' in template".to_string(),
                    ));
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Convenience for rendering with a slice of pairs.
pub fn render_with(template: &str, pairs: &[(&str, &str)]) -> Result<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    render(template, &vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_substitution() {
        let out = render_with("정답: {target}", &[("target", "스마트폰")]).unwrap();
        assert_eq!(out, "정답: 스마트폰");
    }

    #[test]
    fn test_multiple_placeholders() {
        let out = render_with(
            "{toon}\n질문: {question}",
            &[("toon", "target: 말"), ("question", "동물인가요?")],
        )
        .unwrap();
        assert_eq!(out, "target: 말\n질문: 동물인가요?");
    }

    #[test]
    fn test_doubled_braces_are_literal() {
        let out = render_with("예시: {{\"answer\": \"예\"}}", &[]).unwrap();
        assert_eq!(out, "예시: {\"answer\": \"예\"}");
    }

    #[test]
    fn test_idempotent_without_variables() {
        let template = "JSON 형식: {{\"result\": \"정답\"}}";
        let once = render_with(template, &[]).unwrap();
        assert_eq!(once, "JSON 형식: {\"result\": \"정답\"}");
    }

    #[test]
    fn test_unknown_placeholder_errors() {
        assert!(render_with("{missing}", &[]).is_err());
    }

    #[test]
    fn test_unclosed_placeholder_errors() {
        assert!(render_with("{open", &[]).is_err());
    }

    #[test]
    fn test_stray_close_brace_errors() {
        assert!(render_with("oops }", &[]).is_err());
    }
}
