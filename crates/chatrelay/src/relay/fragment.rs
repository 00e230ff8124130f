//! Parsing of raw provider fragments

use serde_json::Value;

/// Extract the delta text from one streamed chunk.
///
/// Chunks look like:
/// ```json
/// {"id":"chatcmpl-123","choices":[{"index":0,"delta":{"content":"Hello"}}]}
/// ```
/// Anything that is not JSON, has no choices, or carries an empty delta
/// yields `None`.
pub fn parse_delta(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;

    let content = value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;

    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta_content() {
        let raw = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_delta(raw), Some("Hello".to_string()));
    }

    #[test]
    fn test_parse_delta_keeps_whitespace() {
        let raw = r#"{"choices":[{"delta":{"content":" world"}}]}"#;
        assert_eq!(parse_delta(raw), Some(" world".to_string()));
    }

    #[test]
    fn test_role_only_delta_skipped() {
        let raw = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_delta(raw), None);
    }

    #[test]
    fn test_empty_or_null_content_skipped() {
        assert_eq!(parse_delta(r#"{"choices":[{"delta":{"content":""}}]}"#), None);
        assert_eq!(parse_delta(r#"{"choices":[{"delta":{"content":null}}]}"#), None);
    }

    #[test]
    fn test_no_choices_skipped() {
        assert_eq!(parse_delta(r#"{"choices":[]}"#), None);
        assert_eq!(parse_delta(r#"{"usage":{"total_tokens":3}}"#), None);
    }

    #[test]
    fn test_invalid_json_skipped() {
        assert_eq!(parse_delta("[DONE]"), None);
        assert_eq!(parse_delta("{not json"), None);
    }
}
