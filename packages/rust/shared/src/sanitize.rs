//! Inbound message sanitization.
//!
//! Applied to every message before routing: caps length, strips embedded
//! markup, and masks known prompt-injection phrases so they never reach a
//! grounding prompt verbatim.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum message length kept after sanitization.
pub const MAX_MESSAGE_LEN: usize = 4000;

static SCRIPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<\s*script[^>]*>.*?<\s*/\s*script\s*>").unwrap());
static STYLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<\s*style[^>]*>.*?<\s*/\s*style\s*>").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static DANGEROUS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)ignore previous instructions").unwrap(),
        Regex::new(r"(?i)system prompt").unwrap(),
        Regex::new(r"(?i)jailbreak").unwrap(),
    ]
});

/// Sanitize an inbound chat message.
pub fn sanitize_text(text: &str) -> String {
    sanitize_with_limit(text, MAX_MESSAGE_LEN)
}

/// Sanitize with an explicit length cap (character-boundary safe).
pub fn sanitize_with_limit(text: &str, max_len: usize) -> String {
    let mut text: String = text.chars().take(max_len).collect();
    text = SCRIPT_TAG.replace_all(&text, "").into_owned();
    text = STYLE_TAG.replace_all(&text, "").into_owned();
    text = HTML_TAG.replace_all(&text, "").into_owned();
    for pat in DANGEROUS_PATTERNS.iter() {
        text = pat.replace_all(&text, "[blocked]").into_owned();
    }
    text.trim().to_string()
}
