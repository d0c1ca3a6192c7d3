//! Redaction of credentials before they reach logs or error messages.

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization:\s*)([^\s,]+(?:\s+[^\s,]+)?)",
        r"(?i)(bearer\s+)([\w\-\.=:/+]+)",
        r"(?i)([A-Z0-9_]*(?:KEY|TOKEN|SECRET|PASSWORD)=)([^\s&]+)",
        r"(?i)([?&](?:api_?key|token|access_token)=)([^\s&]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// ```rust
/// use quarry_util::redact_sensitive;
///
/// assert_eq!(redact_sensitive("GRAPH_API_KEY=abc123"), "GRAPH_API_KEY=[REDACTED]");
/// assert_eq!(redact_sensitive("Authorization: Bearer secret123"), "Authorization: [REDACTED]");
/// ```
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}{REDACTED}")
            })
            .into_owned();
    }
    redacted
}

/// Replaces every occurrence of a known secret (for example an API key
/// embedded in a URL path) and then applies [`redact_sensitive`].
pub fn redact_secret(input: &str, secret: &str) -> String {
    let secret = secret.trim();
    if secret.is_empty() {
        return redact_sensitive(input);
    }
    redact_sensitive(&input.replace(secret, REDACTED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_env_style_assignments() {
        assert_eq!(
            redact_sensitive("QUARRY_API_TOKEN=abc SECRET=xyz other=1"),
            "QUARRY_API_TOKEN=[REDACTED] SECRET=[REDACTED] other=1"
        );
    }

    #[test]
    fn redacts_query_string_keys() {
        assert_eq!(
            redact_sensitive("https://example.com/data?api_key=abc&page=2"),
            "https://example.com/data?api_key=[REDACTED]&page=2"
        );
    }

    #[test]
    fn redacts_known_secret_in_url_path() {
        let url = "https://gateway.thegraph.com/api/deadbeef42/subgraphs/id/QmXyz";
        assert_eq!(
            redact_secret(url, "deadbeef42"),
            "https://gateway.thegraph.com/api/[REDACTED]/subgraphs/id/QmXyz"
        );
        assert_eq!(redact_secret(url, "  "), url);
    }
}
