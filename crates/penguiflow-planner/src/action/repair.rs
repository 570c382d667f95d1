//! Lenient JSON extraction from raw LLM output.
//!
//! LLMs rarely emit a bare JSON object; they wrap it in explanatory prose,
//! markdown code fences, trailing commas, or single-quoted strings. This
//! module turns "mostly JSON" text into something `serde_json` will accept,
//! without attempting a full recovery of arbitrarily broken JSON — that's
//! what the one bounded "fix the JSON" retry round (spec §4.8) is for.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn trailing_comma_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("valid regex"))
}

/// Strip a leading/trailing markdown code fence (```` ```json ... ``` ````
/// or plain ```` ``` ... ``` ````) if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches('\n');
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Strip prose surrounding a JSON object: keep only the substring from the
/// first `{` to its matching closing `}`, tracking string/escape state so
/// braces inside string literals don't confuse the match.
fn strip_prose(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Normalize single-quoted keys/strings to double quotes. This is a
/// best-effort pass, not a real JSON5 parser: it assumes the model used
/// single quotes consistently in place of double quotes rather than mixing
/// both (the common failure mode), and leaves apostrophes inside an
/// already-double-quoted string untouched.
fn normalize_quotes(text: &str) -> String {
    if !text.contains('\'') || text.contains('"') {
        return text.to_string();
    }
    text.replace('\'', "\"")
}

fn strip_trailing_commas(text: &str) -> String {
    trailing_comma_pattern().replace_all(text, "$1").into_owned()
}

/// Attempt to extract and parse a JSON object out of raw LLM text, applying
/// (in order) code-fence stripping, prose stripping, quote normalization,
/// and trailing-comma tolerance. Returns `None` if no parseable JSON object
/// could be recovered at all.
pub fn extract_json(raw: &str) -> Option<Value> {
    let fenced = strip_code_fence(raw);

    if let Ok(value) = serde_json::from_str(fenced) {
        return Some(value);
    }

    let candidate = strip_prose(fenced)?;

    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }

    let normalized = normalize_quotes(candidate);
    if let Ok(value) = serde_json::from_str(&normalized) {
        return Some(value);
    }

    let desugared = strip_trailing_commas(&normalized);
    serde_json::from_str(&desugared).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let value = extract_json(r#"{"thought": "ok", "next_node": "search", "args": {}}"#).unwrap();
        assert_eq!(value["next_node"], "search");
    }

    #[test]
    fn strips_prose_around_object() {
        let raw = "Sure, here's my plan:\n{\"thought\": \"go\", \"next_node\": \"search\", \"args\": {}}\nHope that helps!";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["thought"], "go");
    }

    #[test]
    fn strips_code_fence() {
        let raw = "```json\n{\"thought\": \"go\", \"next_node\": \"search\", \"args\": {}}\n```";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["next_node"], "search");
    }

    #[test]
    fn tolerates_trailing_commas() {
        let raw = r#"{"thought": "go", "next_node": "search", "args": {"q": "rust",},}"#;
        let value = extract_json(raw).unwrap();
        assert_eq!(value["args"]["q"], "rust");
    }

    #[test]
    fn normalizes_single_quotes() {
        let raw = "{'thought': 'go', 'next_node': 'search', 'args': {}}";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["next_node"], "search");
    }

    #[test]
    fn returns_none_for_unrecoverable_text() {
        assert!(extract_json("I don't have a JSON answer for you.").is_none());
    }

    #[test]
    fn ignores_braces_inside_string_values() {
        let raw = r#"{"thought": "contains a { brace }", "next_node": "search", "args": {}}"#;
        let value = extract_json(raw).unwrap();
        assert_eq!(value["thought"], "contains a { brace }");
    }
}
