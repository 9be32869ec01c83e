//! Request input sanitization.
//! Values are trimmed, length-checked, then HTML-escaped before they reach the store.

use thiserror::Error;

/// Default upper bound for record content, in characters.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 500;

/// Upper bound for a restore timestamp path segment, in characters.
pub const MAX_TIMESTAMP_CHARS: usize = 27;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyInput { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    InputTooLong { field: &'static str, max: usize },
}

/// Sanitize record content supplied by a client (or by `--seed`).
pub fn sanitize_content(raw: &str, max_chars: usize) -> Result<String, ValidationError> {
    sanitize("data", raw, max_chars)
}

/// Sanitize the `timestamp` path parameter of a restore request.
pub fn sanitize_timestamp(raw: &str) -> Result<String, ValidationError> {
    sanitize("timestamp", raw, MAX_TIMESTAMP_CHARS)
}

fn sanitize(field: &'static str, raw: &str, max_chars: usize) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let length = trimmed.chars().count();
    if length == 0 {
        return Err(ValidationError::EmptyInput { field });
    }
    if length > max_chars {
        return Err(ValidationError::InputTooLong { field, max: max_chars });
    }
    Ok(escape_html(trimmed))
}

/// Replace characters with HTML meaning by their entity form.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '/' => escaped.push_str("&#x2F;"),
            '\\' => escaped.push_str("&#x5C;"),
            '`' => escaped.push_str("&#96;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed_and_escaped() {
        assert_eq!(
            sanitize_content("  <b>Tom & Jerry's</b>  ", DEFAULT_MAX_CONTENT_CHARS),
            Ok("&lt;b&gt;Tom &amp; Jerry&#x27;s&lt;&#x2F;b&gt;".to_string())
        );
    }

    #[test]
    fn blank_content_is_rejected() {
        assert_eq!(
            sanitize_content(" \n\t ", DEFAULT_MAX_CONTENT_CHARS),
            Err(ValidationError::EmptyInput { field: "data" })
        );
    }

    #[test]
    fn length_is_counted_in_characters_before_escaping() {
        let exact = "é".repeat(DEFAULT_MAX_CONTENT_CHARS);
        assert!(sanitize_content(&exact, DEFAULT_MAX_CONTENT_CHARS).is_ok());

        let escaped_growth = "&".repeat(DEFAULT_MAX_CONTENT_CHARS);
        assert!(sanitize_content(&escaped_growth, DEFAULT_MAX_CONTENT_CHARS).is_ok());

        let over = "a".repeat(DEFAULT_MAX_CONTENT_CHARS + 1);
        assert_eq!(
            sanitize_content(&over, DEFAULT_MAX_CONTENT_CHARS),
            Err(ValidationError::InputTooLong { field: "data", max: DEFAULT_MAX_CONTENT_CHARS })
        );
    }

    #[test]
    fn timestamp_bounds() {
        assert_eq!(
            sanitize_timestamp(" 2026-10-19T08:15:30.123Z "),
            Ok("2026-10-19T08:15:30.123Z".to_string())
        );
        assert_eq!(
            sanitize_timestamp(""),
            Err(ValidationError::EmptyInput { field: "timestamp" })
        );
        assert_eq!(
            sanitize_timestamp(&"9".repeat(MAX_TIMESTAMP_CHARS + 1)),
            Err(ValidationError::InputTooLong { field: "timestamp", max: MAX_TIMESTAMP_CHARS })
        );
    }

    #[test]
    fn error_messages_read_as_sentences() {
        let err = ValidationError::InputTooLong { field: "data", max: 500 };
        assert_eq!(err.to_string(), "data must be at most 500 characters");
    }
}
