//! TOON (Token-Oriented Object Notation) encoding.
//!
//! A compact, human-readable encoding that minimizes tokens when embedding
//! structured data in LLM prompts. Scalars render as literals, uniform
//! object arrays render as `[N]{k1,k2}:` tables, and nested objects indent
//! by two spaces.

use serde_json::{Map, Value, json};

use crate::error::{GatewayError, Result};

const QUOTE_TRIGGERS: &[char] = &[',', ':', '\n', '"', '\''];

fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

fn same_keys(items: &[Value]) -> Option<Vec<String>> {
    let first = items.first()?.as_object()?;
    let keys: Vec<String> = first.keys().cloned().collect();
    for item in items {
        let obj = item.as_object()?;
        if obj.len() != keys.len() || !keys.iter().all(|k| obj.contains_key(k)) {
            return None;
        }
    }
    Some(keys)
}

/// Encode a JSON value to TOON format.
pub fn encode(data: &Value) -> String {
    encode_at(data, 0)
}

fn encode_at(data: &Value, indent: usize) -> String {
    let prefix = " ".repeat(indent);

    match data {
        Value::Null => "null".to_string(),
        Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if s.chars().any(|c| QUOTE_TRIGGERS.contains(&c)) {
                format!("\"{}\"", s.replace('"', "\\\""))
            } else {
                s.clone()
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                return "[]".to_string();
            }
            if items.iter().all(is_primitive) {
                let encoded: Vec<String> = items.iter().map(|v| encode_at(v, 0)).collect();
                return format!("[{}]: {}", items.len(), encoded.join(","));
            }
            if let Some(keys) = same_keys(items) {
                let header = format!("[{}]{{{}}}:", items.len(), keys.join(","));
                let rows: Vec<String> = items
                    .iter()
                    .map(|item| {
                        let obj = item.as_object().expect("checked by same_keys");
                        let cells: Vec<String> =
                            keys.iter().map(|k| encode_at(&obj[k], 0)).collect();
                        format!("{} {}", prefix, cells.join(","))
                    })
                    .collect();
                return format!("{}\n{}", header, rows.join("\n"));
            }
            let mut lines = vec![format!("[{}]:", items.len())];
            for item in items {
                lines.push(format!("{}  - {}", prefix, encode_at(item, indent + 2)));
            }
            lines.join("\n")
        }
        Value::Object(map) => {
            if map.is_empty() {
                return "{}".to_string();
            }
            let mut lines: Vec<String> = Vec::new();
            for (key, value) in map {
                match value {
                    Value::Object(sub) if !sub.is_empty() => {
                        lines.push(format!("{}:", key));
                        for (sub_key, sub_value) in sub {
                            lines.push(format!(
                                "{}  {}: {}",
                                prefix,
                                sub_key,
                                encode_at(sub_value, indent + 2)
                            ));
                        }
                    }
                    Value::Array(items)
                        if !items.is_empty() && items.iter().all(|v| v.is_object()) =>
                    {
                        match same_keys(items) {
                            Some(keys) => {
                                lines.push(format!(
                                    "{}[{}]{{{}}}:",
                                    key,
                                    items.len(),
                                    keys.join(",")
                                ));
                                for item in items {
                                    let obj = item.as_object().expect("checked above");
                                    let cells: Vec<String> =
                                        keys.iter().map(|k| encode_at(&obj[k], 0)).collect();
                                    lines.push(format!("{}  {}", prefix, cells.join(",")));
                                }
                            }
                            None => {
                                lines.push(format!("{}: {}", key, encode_at(value, indent)));
                            }
                        }
                    }
                    _ => lines.push(format!("{}: {}", key, encode_at(value, indent))),
                }
            }
            lines.join("\n")
        }
    }
}

/// Encode the twenty-questions secret payload.
pub fn encode_secret(target: &str, category: &str, details: Option<&Value>) -> String {
    let mut data = Map::new();
    data.insert("target".to_string(), json!(target));
    data.insert("category".to_string(), json!(category));
    if let Some(details) = details {
        data.insert("details".to_string(), details.clone());
    }
    encode(&Value::Object(data))
}

/// Encode the turtle-soup puzzle payload.
pub fn encode_puzzle(
    scenario: &str,
    solution: &str,
    category: Option<&str>,
    difficulty: Option<i64>,
) -> String {
    let mut data = Map::new();
    data.insert("scenario".to_string(), json!(scenario));
    data.insert("solution".to_string(), json!(solution));
    if let Some(category) = category {
        data.insert("category".to_string(), json!(category));
    }
    if let Some(difficulty) = difficulty {
        data.insert("difficulty".to_string(), json!(difficulty));
    }
    encode(&Value::Object(data))
}

// ---------------------------------------------------------------------------
// Decoding (the encoder's output subset)
// ---------------------------------------------------------------------------

fn parse_scalar(raw: &str) -> Value {
    let raw = raw.trim();
    if raw == "null" {
        return Value::Null;
    }
    if raw == "true" {
        return Value::Bool(true);
    }
    if raw == "false" {
        return Value::Bool(false);
    }
    if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
        return Value::String(raw[1..raw.len() - 1].replace("\\\"", "\""));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return json!(f);
    }
    Value::String(raw.to_string())
}

fn parse_inline_list(raw: &str) -> Option<Value> {
    // "[N]: a,b,c" or "[]"
    if raw.trim() == "[]" {
        return Some(Value::Array(Vec::new()));
    }
    let rest = raw.strip_prefix('[')?;
    let close = rest.find("]: ")?;
    let items: Vec<Value> = rest[close + 3..].split(',').map(parse_scalar).collect();
    Some(Value::Array(items))
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Decode a TOON document produced by [`encode`] back into a JSON value.
/// Supports objects with scalar values, inline primitive lists, table
/// arrays, and nested objects; generic `- item` lists are not decoded.
pub fn decode(text: &str) -> Result<Value> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    if lines.len() == 1 {
        let only = lines[0].trim();
        if only.starts_with('[') {
            if let Some(list) = parse_inline_list(only) {
                return Ok(list);
            }
        }
        if !only.contains(": ") && !only.ends_with(':') {
            return Ok(parse_scalar(only));
        }
    }
    let (value, consumed) = decode_object(&lines, 0, indent_of(lines[0]))?;
    if consumed != lines.len() {
        return Err(GatewayError::Internal(format!(
            "trailing TOON content at line {}",
            consumed + 1
        )));
    }
    Ok(value)
}

fn decode_object(lines: &[&str], start: usize, indent: usize) -> Result<(Value, usize)> {
    let mut map = Map::new();
    let mut i = start;

    while i < lines.len() {
        let line = lines[i];
        if indent_of(line) < indent {
            break;
        }
        let trimmed = line.trim_start();

        if let Some((head, rest)) = trimmed.split_once(':') {
            // Table header: key[N]{k1,k2}:
            if rest.is_empty() && head.contains('[') && head.contains('{') {
                let bracket = head.find('[').expect("checked above");
                let key = head[..bracket].to_string();
                let cols_start = head.find('{').ok_or_else(|| {
                    GatewayError::Internal(format!("malformed TOON table header: {head}"))
                })?;
                let cols_end = head.find('}').ok_or_else(|| {
                    GatewayError::Internal(format!("malformed TOON table header: {head}"))
                })?;
                let keys: Vec<&str> = head[cols_start + 1..cols_end].split(',').collect();
                let mut rows = Vec::new();
                i += 1;
                while i < lines.len() && indent_of(lines[i]) > indent {
                    let cells: Vec<Value> =
                        lines[i].trim().split(',').map(parse_scalar).collect();
                    let mut row = Map::new();
                    for (k, v) in keys.iter().zip(cells) {
                        row.insert(k.to_string(), v);
                    }
                    rows.push(Value::Object(row));
                    i += 1;
                }
                map.insert(key, Value::Array(rows));
                continue;
            }

            // Nested object: "key:" followed by deeper lines.
            if rest.is_empty() {
                let key = head.to_string();
                let (nested, consumed) = decode_object(lines, i + 1, indent + 2)?;
                map.insert(key, nested);
                i = consumed;
                continue;
            }

            // Scalar or inline list on one line.
            let raw = rest.trim_start();
            let value = match raw.strip_prefix('[') {
                Some(_) => parse_inline_list(raw).unwrap_or_else(|| parse_scalar(raw)),
                None => parse_scalar(raw),
            };
            map.insert(head.to_string(), value);
            i += 1;
            continue;
        }

        return Err(GatewayError::Internal(format!(
            "unparseable TOON line: {line}"
        )));
    }

    Ok((Value::Object(map), i))
}
