/// Maximum length for error body content in error messages
pub const MAX_ERROR_BODY_LEN: usize = 200;

/// First `max` characters of `s`, without any marker.
pub fn char_prefix(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Single-line preview of a model response for logs.
pub fn log_preview(s: &str, max: usize) -> String {
    char_prefix(s, max).replace('\n', "\\n")
}

/// Cap `s` at `max` characters, appending `marker` when something was cut.
pub fn truncate_with_marker(s: &str, max: usize, marker: &str) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = char_prefix(s, max);
    out.push_str(marker);
    out
}

/// Sanitize an API error body to prevent credential leakage.
/// Truncates long responses and redacts potential secrets.
pub fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",        // GitHub personal access token prefix
        "gho_",        // GitHub OAuth token prefix
        "ghs_",        // GitHub Actions installation token prefix
        "github_pat_", // GitHub PAT prefix
    ];

    let truncated = truncate_with_marker(body, MAX_ERROR_BODY_LEN, "... (truncated)");

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(error details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated
}

/// Replace every occurrence of `secret` in `text`.
pub fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "***")
}
