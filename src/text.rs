use regex::Regex;
use std::sync::OnceLock;

static PUNCTUATION: OnceLock<Regex> = OnceLock::new();

fn punctuation_re() -> &'static Regex {
    #[allow(clippy::expect_used)] // literal pattern, cannot fail to compile
    PUNCTUATION.get_or_init(|| Regex::new(r"[^\w\s]").expect("valid literal pattern"))
}

/// Remove every non-word, non-space character from a transcription.
///
/// Word characters and whitespace survive unchanged, so the result is safe
/// to hand to a keystroke injector without quoting concerns.
#[must_use]
pub fn strip_punctuation(text: &str) -> String {
    punctuation_re().replace_all(text, "").into_owned()
}

/// Generate preview of text for logging (pure, testable)
///
/// Truncates text >50 chars with "..." suffix. Respects UTF-8 char boundaries.
#[must_use]
pub fn preview(text: &str) -> String {
    if text.len() > 50 {
        // Find char boundary at or before byte 47
        let mut end = 47.min(text.len());
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            return "...".to_owned();
        }
        format!("{}...", &text[..end])
    } else {
        text.to_owned()
    }
}
