//! Tolerant parsing of model output into JSON objects

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::{GenerationFailure, SynthError, SynthResult};

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

static FENCE_START: OnceLock<Regex> = OnceLock::new();
static FENCE_END: OnceLock<Regex> = OnceLock::new();
static CONTROL: OnceLock<Regex> = OnceLock::new();
static WHITESPACE: OnceLock<Regex> = OnceLock::new();
static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();
static REPEATED_COMMA: OnceLock<Regex> = OnceLock::new();

/// Normalize a raw completion into something that is likely a single JSON object
pub fn clean_response(response: &str) -> String {
    let text = regex(&FENCE_START, r"^```(?:json)?\s*").replace(response.trim(), "");
    let text = regex(&FENCE_END, r"\s*```$").replace(&text, "");
    let text = regex(&CONTROL, r"[\x00-\x08\x0B\x0C\x0E-\x1F]").replace_all(&text, "");
    let text = regex(&WHITESPACE, r"\s+").replace_all(&text, " ");
    let text = escape_stray_backslashes(&text);
    let text = regex(&TRAILING_COMMA, r",\s*([}\]])").replace_all(&text, "$1");
    let text = regex(&REPEATED_COMMA, r",\s*,+").replace_all(&text, ",");

    match end_of_first_object(&text) {
        Some(end) => text[..end].to_string(),
        None => text.into_owned(),
    }
}

/// Double any backslash that does not start a valid JSON escape
fn escape_stray_backslashes(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }
        let valid = match chars.peek() {
            Some('u') => is_unicode_escape(chars.clone()),
            Some(&next) => matches!(next, '\\' | '/' | '"' | 'b' | 'f' | 'n' | 'r' | 't'),
            None => false,
        };
        match chars.next() {
            Some(next) if valid => {
                output.push('\\');
                output.push(next);
            }
            Some(next) => {
                output.push_str("\\\\");
                output.push(next);
            }
            None => output.push_str("\\\\"),
        }
    }
    output
}

/// `u` followed by exactly four hex digits
fn is_unicode_escape(mut rest: impl Iterator<Item = char>) -> bool {
    rest.next() == Some('u') && (0..4).all(|_| rest.next().is_some_and(|c| c.is_ascii_hexdigit()))
}

/// Byte offset just past the `}` closing the first top-level object
fn end_of_first_object(text: &str) -> Option<usize> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Offset of the last `,` separating members of the outermost object
fn last_top_level_comma(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut last = None;

    for (offset, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            ',' if depth == 1 => last = Some(offset),
            _ => {}
        }
    }
    last
}

/// Parse a completion as JSON, trying progressively more forgiving strategies
pub fn parse_lenient(response: &str) -> SynthResult<Value> {
    let cleaned = clean_response(response);

    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => return Ok(value),
        Err(e) => warn!("JSON parsing failed with strict parse: {}", e),
    }

    let body = match cleaned.find('{') {
        Some(start) => &cleaned[start..],
        None => {
            return Err(SynthError::generation(
                GenerationFailure::MalformedJson,
                format!("no JSON object in response ({} chars)", cleaned.len()),
            ))
        }
    };

    // First complete value, ignoring anything after it
    let mut stream = serde_json::Deserializer::from_str(body).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => {
            info!("Parsed JSON prefix, ignoring trailing text");
            return Ok(value);
        }
        Some(Err(e)) => warn!("JSON parsing failed with prefix parse: {}", e),
        None => {}
    }

    // Truncated output: keep every member before the last top-level comma
    if let Some(cut) = last_top_level_comma(body) {
        let salvaged = format!("{}}}", &body[..cut]);
        if let Ok(value) = serde_json::from_str::<Value>(&salvaged) {
            let recovered = value.as_object().map(Map::len).unwrap_or(0);
            warn!("⚠️  Parsed truncated JSON, recovered {} fields", recovered);
            return Ok(value);
        }
    }

    Err(SynthError::generation(
        GenerationFailure::MalformedJson,
        format!("failed to parse JSON response with all methods ({} chars)", cleaned.len()),
    ))
}

/// Like [`parse_lenient`] but the top level must be an object
pub fn parse_object(response: &str) -> SynthResult<Map<String, Value>> {
    match parse_lenient(response)? {
        Value::Object(map) => Ok(map),
        other => Err(SynthError::generation(
            GenerationFailure::MalformedJson,
            format!("expected a JSON object, got {}", json_kind(&other)),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Flatten nested objects into dotted keys; empty objects are dropped
pub fn flatten(map: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(map, "", &mut flat);
    flat
}

fn flatten_into(map: &Map<String, Value>, prefix: &str, flat: &mut Map<String, Value>) {
    for (key, value) in map {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) if inner.is_empty() => {}
            Value::Object(inner) => flatten_into(inner, &full_key, flat),
            other => {
                flat.insert(full_key, other.clone());
            }
        }
    }
}

pub fn is_nested(map: &Map<String, Value>) -> bool {
    map.values().any(Value::is_object)
}
