//! Input sanitizer applied to the post before it is forwarded upstream.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
// 0x09 (tab) and 0x0A (newline) are kept.
static CONTROL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B-\x1F\x7F]").unwrap());

/// Remove tag-like `<...>` sequences and ASCII control characters (newline and
/// tab excepted), then trim surrounding whitespace. Total and idempotent.
pub fn sanitize_input(text: &str) -> String {
    let without_tags = TAG_RE.replace_all(text, "");
    let without_controls = CONTROL_RE.replace_all(&without_tags, "");
    without_controls.trim().to_string()
}
