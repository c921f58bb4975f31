//! Structural validation of inbound frames and sanitization of free text.

use super::SecurityError;
use crate::config::SecurityConfig;
use serde_json::Value;

/// Validates a raw frame against the configured JSON limits.
pub fn validate_json_message(message: &[u8], config: &SecurityConfig) -> Result<(), SecurityError> {
    if message.len() > config.max_message_size {
        return Err(SecurityError::MessageTooLarge(message.len()));
    }

    let json: Value = serde_json::from_slice(message)
        .map_err(|e| SecurityError::InvalidMessageFormat(e.to_string()))?;

    if !json.is_object() {
        return Err(SecurityError::InvalidMessageFormat(
            "Frame must be a JSON object".to_string(),
        ));
    }

    validate_json_value(&json, 0, config)
}

/// Recursively validates a JSON value
fn validate_json_value(value: &Value, depth: usize, config: &SecurityConfig) -> Result<(), SecurityError> {
    if depth > config.max_json_depth {
        return Err(SecurityError::InvalidMessageFormat(
            "JSON nesting too deep".to_string(),
        ));
    }

    match value {
        Value::String(s) => validate_string(s, config)?,
        Value::Array(arr) => {
            if arr.len() > config.max_collection_size {
                return Err(SecurityError::InvalidMessageFormat(format!(
                    "Array too large: {} elements",
                    arr.len()
                )));
            }
            for item in arr {
                validate_json_value(item, depth + 1, config)?;
            }
        }
        Value::Object(obj) => {
            if obj.len() > config.max_collection_size {
                return Err(SecurityError::InvalidMessageFormat(format!(
                    "Object too large: {} keys",
                    obj.len()
                )));
            }
            for (key, val) in obj {
                validate_string(key, config)?;
                validate_json_value(val, depth + 1, config)?;
            }
        }
        Value::Number(_) | Value::Bool(_) | Value::Null => {}
    }

    Ok(())
}

fn validate_string(s: &str, config: &SecurityConfig) -> Result<(), SecurityError> {
    if s.chars().count() > config.max_string_length {
        return Err(SecurityError::InvalidMessageFormat(format!(
            "String too long: {} characters",
            s.chars().count()
        )));
    }
    if s.chars().any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t')) {
        return Err(SecurityError::ForbiddenContent);
    }
    Ok(())
}

/// Validates an event name: 1 to 64 characters of `[A-Za-z0-9_-]`.
pub fn validate_event_name(event_name: &str) -> Result<(), SecurityError> {
    if event_name.is_empty() || event_name.len() > 64 {
        return Err(SecurityError::InvalidMessageFormat(
            "Invalid event name length".to_string(),
        ));
    }

    if !event_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(SecurityError::InvalidMessageFormat(
            "Invalid event name characters".to_string(),
        ));
    }

    Ok(())
}

/// Trims a display name, strips control characters and caps its length.
pub fn sanitize_display_name(input: &str, max_chars: usize) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(max_chars)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SecurityConfig {
        SecurityConfig::default()
    }

    #[test]
    fn test_accepts_regular_envelope() {
        let frame = br#"{"event":"chess-move","data":{"matchId":"abc","from":"e2","to":"e4"}}"#;
        assert!(validate_json_message(frame, &config()).is_ok());
    }

    #[test]
    fn test_rejects_non_object_and_garbage() {
        assert!(validate_json_message(b"[1,2,3]", &config()).is_err());
        assert!(validate_json_message(b"not json", &config()).is_err());
    }

    #[test]
    fn test_rejects_deep_nesting() {
        let mut json = String::from("{");
        for _ in 0..12 {
            json.push_str(r#""n": {"#);
        }
        json.push_str(r#""v": true"#);
        for _ in 0..12 {
            json.push('}');
        }
        json.push('}');

        assert!(validate_json_message(json.as_bytes(), &config()).is_err());
    }

    #[test]
    fn test_rejects_control_characters() {
        let frame = "{\"event\":\"create-match\",\"data\":{\"displayName\":\"a\\u0000b\"}}";
        assert_eq!(
            validate_json_message(frame.as_bytes(), &config()),
            Err(SecurityError::ForbiddenContent)
        );
    }

    #[test]
    fn test_custom_limits() {
        let config = SecurityConfig {
            max_string_length: 5,
            ..SecurityConfig::default()
        };
        assert!(validate_json_message(br#"{"key": "toolong"}"#, &config).is_err());
        assert!(validate_json_message(br#"{"key": "ok"}"#, &config).is_ok());
    }

    #[test]
    fn test_validate_event_name() {
        assert!(validate_event_name("cancel_match").is_ok());
        assert!(validate_event_name("respond-draw").is_ok());
        assert!(validate_event_name("").is_err());
        assert!(validate_event_name("drop table!").is_err());
    }

    #[test]
    fn test_sanitize_display_name() {
        assert_eq!(sanitize_display_name("  Magnus\u{7}  ", 32), "Magnus");
        assert_eq!(sanitize_display_name("abcdefgh", 3), "abc");
    }
}
