//! Redaction of secrets from error messages before they reach logs or users.

use once_cell::sync::Lazy;
use regex::Regex;

/// URLs with embedded `user:password@` credentials
static URL_WITH_CREDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://)[^:@\s]+:[^@\s]+@").unwrap());

/// Sequences of 32+ characters that are alphanumeric, underscore, or dash
static POTENTIAL_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_-])[A-Za-z0-9_-]{32,}(?:[^A-Za-z0-9_-]|$)").unwrap()
});

/// Remove credentials and API-key-shaped tokens from a message.
///
/// Provider error bodies sometimes echo the request URL or key back; every
/// error string that crosses a crate boundary goes through here first.
#[must_use]
pub fn redact_error_message(message: &str) -> String {
    let redacted = URL_WITH_CREDS.replace_all(message, "$1[REDACTED]@");
    let redacted = POTENTIAL_KEY.replace_all(&redacted, "[REDACTED_KEY]");
    redacted.to_string()
}

/// Truncate a provider response body for inclusion in an error message.
#[must_use]
pub fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
