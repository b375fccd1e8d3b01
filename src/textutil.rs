//! UTF-8-safe truncation and secret masking helpers.
//!
//! Tool output and log lines are clipped in several places; slicing bytes
//! directly panics when the cut lands inside a multi-byte character.

/// Return a UTF-8-safe prefix whose byte length is at most `max_bytes`.
pub fn safe_prefix_by_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }

    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Truncate by bytes and append `suffix` when truncation occurs.
pub fn truncate_with_suffix_by_bytes(text: &str, max_bytes: usize, suffix: &str) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    format!("{}{suffix}", safe_prefix_by_bytes(text, max_bytes))
}

/// Mask a bearer token or API key for display and logs.
///
/// Keeps a short recognizable prefix and the last four characters; anything
/// too short to mask meaningfully collapses to `****`.
pub fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    let count = trimmed.chars().count();
    if count <= 10 {
        return "****".to_string();
    }
    let head: String = trimmed.chars().take(3).collect();
    let tail: String = trimmed.chars().skip(count - 4).collect();
    format!("{head}...{tail}")
}
