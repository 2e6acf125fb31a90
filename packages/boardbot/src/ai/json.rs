//! Lenient JSON extraction from model replies.

use openai_client::strip_code_blocks;
use serde_json::{Map, Value};
use tracing::warn;

/// Parse the first JSON object in a model reply.
///
/// Code fences and surrounding prose are ignored. A reply with no parseable
/// object yields an empty object, so callers fall back to their defaults.
pub fn parse_object(reply: &str) -> Value {
    let text = strip_code_blocks(reply);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return value;
    }

    if let Some(candidate) = first_object(text) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
            return value;
        }
    }

    warn!(reply_len = reply.len(), "model reply carried no JSON object");
    Value::Object(Map::new())
}

/// Slice of the first balanced `{...}` in `text`, honouring string literals.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
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

/// Read a string field, trimming whitespace. Empty strings count as absent.
pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_and_fenced_objects() {
        assert_eq!(parse_object(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(parse_object("```json\n{\"a\": 2}\n```"), json!({"a": 2}));
    }

    #[test]
    fn test_object_inside_prose() {
        let reply = r#"Sure! Here you go: {"message": "use {braces} freely", "n": {"x": 1}} Hope that helps."#;
        assert_eq!(
            parse_object(reply),
            json!({"message": "use {braces} freely", "n": {"x": 1}})
        );
    }

    #[test]
    fn test_malformed_reply_is_empty_object() {
        assert_eq!(parse_object("I cannot help with that."), json!({}));
        assert_eq!(parse_object("{\"unterminated\": "), json!({}));
        assert_eq!(parse_object("[1, 2, 3]"), json!({}));
    }

    #[test]
    fn test_str_field() {
        let value = json!({"a": "  x ", "b": "", "c": 3});
        assert_eq!(str_field(&value, "a"), Some("x"));
        assert_eq!(str_field(&value, "b"), None);
        assert_eq!(str_field(&value, "c"), None);
    }
}
