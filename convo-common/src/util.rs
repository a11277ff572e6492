//! Utility functions for Convo services.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Works on character boundaries, so multi-byte text (emoji, accented names) is safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Sanitize a string for safe logging (redact sensitive patterns).
///
/// Conversations collect identity numbers, emails, and payment phones; inbound
/// text is passed through this before it reaches a log line.
pub fn sanitize_for_log(s: &str) -> String {
    let patterns: &[(&str, &str)] = &[
        (r"(?i)(token|secret|bearer)\s*[=:]\s*\S{10,}", "$1=***REDACTED***"),
        (r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}", "***EMAIL***"),
        (r"\+?\d{9,}", "***NUMBER***"),
    ];

    let mut result = s.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, *replacement).to_string();
        }
    }
    result
}

/// Mask a participant id for logs, keeping the last four characters.
pub fn mask_participant(id: &str) -> String {
    let count = id.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = id.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}
