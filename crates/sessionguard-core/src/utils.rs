//! Small helpers shared across modules.

/// Number of leading characters of a token kept visible in logs
const TOKEN_PREVIEW_CHARS: usize = 6;

/// Mask a credential for logging, keeping only a short prefix.
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(TOKEN_PREVIEW_CHARS).collect();
    if visible.len() == token.len() {
        "*".repeat(token.chars().count())
    } else {
        format!("{}…", visible)
    }
}

/// Join a base URL and an endpoint path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
