//! Response body parsing with diagnostics suitable for error messages.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

const BODY_PREVIEW_LIMIT: usize = 200;

/// Return a user-facing hint for common HTTP status codes.
///
/// ```rust
/// use quarry_util::http::status_error_message;
///
/// assert!(status_error_message(401).expect("mapped").contains("QUARRY_GRAPH_API_KEY"));
/// assert!(status_error_message(404).expect("mapped").contains("not found"));
/// assert!(status_error_message(500).is_none());
/// ```
pub fn status_error_message(status_code: u16) -> Option<String> {
    match status_code {
        401 => Some("Unauthorized (401). Hint: set QUARRY_GRAPH_API_KEY or QUARRY_API_TOKEN".into()),
        403 => Some("Forbidden (403). Hint: check the API key permissions for this endpoint".into()),
        404 => Some("Resource not found (404). Content may not be published or propagated yet".into()),
        429 => Some("Rate limited (429). Hint: retry later or use a dedicated API key".into()),
        _ => None,
    }
}

/// Parse HTTP response text into JSON, providing detailed errors on failure.
///
/// The error carries the originating status code and a whitespace-collapsed
/// preview of the body.
pub fn parse_response_json_strict(text: &str, status: Option<StatusCode>) -> Result<Value, JsonParseError> {
    serde_json::from_str::<Value>(text).map_err(|error| {
        let status_note = status
            .map(|code| format!("status {code}"))
            .unwrap_or_else(|| "unknown status".to_string());
        JsonParseError::new(status_note, error, truncate_response_preview(text, BODY_PREVIEW_LIMIT))
    })
}

/// Collapses whitespace and truncates a response body for diagnostics.
pub fn truncate_response_preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }

    preview.trim().to_string()
}

/// Error returned when strict JSON parsing of an HTTP response fails.
#[derive(Debug, Error)]
#[error("failed to parse JSON response ({status_note}): {source}. body preview: {body_preview}")]
pub struct JsonParseError {
    status_note: String,
    #[source]
    source: serde_json::Error,
    body_preview: String,
}

impl JsonParseError {
    pub fn new(status_note: String, source: serde_json::Error, body_preview: String) -> Self {
        Self {
            status_note,
            source,
            body_preview,
        }
    }

    pub fn body_preview(&self) -> &str {
        &self.body_preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_parse_reports_status_and_preview() {
        let error = parse_response_json_strict("<html>\n<body>oops</body>\n</html>", Some(StatusCode::BAD_GATEWAY))
            .expect_err("html is not json");
        let message = error.to_string();
        assert!(message.contains("status 502"), "message: {message}");
        assert_eq!(error.body_preview(), "<html> <body>oops</body> </html>");
    }

    #[test]
    fn preview_marks_empty_and_truncated_bodies() {
        assert_eq!(truncate_response_preview("   ", 10), "<empty>");
        assert_eq!(truncate_response_preview("abcdefghijkl", 5), "abcde...");
    }
}
