//! Decoding of raw model replies into loosely-typed records.

use serde_json::Value;

use crate::error::ParseError;
use crate::schema::Record;

/// Characters of the reply kept in errors and logs.
pub const SNIPPET_LEN: usize = 200;

/// First `SNIPPET_LEN` characters of `text`.
pub fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_LEN).collect()
}

/// Strip surrounding whitespace and a Markdown code fence, if any.
/// The JSON-tagged opening fence is checked before the bare one.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Decode a raw reply into a record. No schema checks happen here.
pub fn parse_response(raw: &str) -> Result<Record, ParseError> {
    let text = strip_code_fence(raw);
    let value: Value = serde_json::from_str(text).map_err(|source| ParseError::InvalidJson {
        snippet: snippet(text),
        source,
    })?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::NotAnObject {
            snippet: snippet(text),
            found: json_kind(&other),
        }),
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis_json() -> Value {
        json!({
            "cancers": [],
            "study_types": {"clinical": false, "basic": true},
            "mechanisms": {
                "tumor_suppressor_mechanisms": [],
                "oncogenic_mechanisms": [],
                "mutations_described": false
            },
            "confidence": "high",
            "reasoning": "Test",
            "needs_full_text": false
        })
    }

    #[test]
    fn test_fence_style_is_transparent() {
        let body = serde_json::to_string_pretty(&analysis_json()).unwrap();
        let plain = parse_response(&body).unwrap();
        let tagged = parse_response(&format!("```json\n{body}\n```")).unwrap();
        let bare = parse_response(&format!("  ```\n{body}\n```  \n")).unwrap();

        assert_eq!(Value::Object(plain.clone()), analysis_json());
        assert_eq!(plain, tagged);
        assert_eq!(plain, bare);
    }

    #[test]
    fn test_unterminated_fence_still_parses() {
        let parsed = parse_response("```json\n{\"key\": \"value\"}").unwrap();
        assert_eq!(parsed["key"], "value");
    }

    #[test]
    fn test_prose_is_a_parse_error() {
        let err = parse_response("The gene appears to act as a tumor suppressor.").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson { .. }));
        assert!(err.snippet().starts_with("The gene appears"));
        assert!(err.to_string().starts_with("Invalid JSON response"));
    }

    #[test]
    fn test_truncated_json_is_a_parse_error() {
        assert!(parse_response("{\"cancers\": [").is_err());
    }

    #[test]
    fn test_non_object_json_is_rejected() {
        let err = parse_response("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ParseError::NotAnObject { found: "an array", .. }));
    }

    #[test]
    fn test_snippet_is_bounded_on_char_boundaries() {
        let long = "é".repeat(500);
        assert_eq!(snippet(&long).chars().count(), SNIPPET_LEN);
    }
}
