//! Canonical form of proxy display names used for keyword matching.

use regex::Regex;
use std::sync::LazyLock;

// Pictographic blocks. Flag emoji (regional indicators) fall outside these
// ranges and are turned into spaces by DISALLOWED instead.
static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x{1F300}-\x{1F6FF}\x{1F900}-\x{1F9FF}\x{2600}-\x{26FF}\x{2700}-\x{27BF}]")
        .expect("emoji pattern")
});

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[/｜丨|·•—–_，,。:：\-]+").expect("separator pattern"));

// Keeps ASCII alphanumerics, the decimal point, whitespace and CJK ideographs.
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9.\s\x{4E00}-\x{9FA5}]").expect("disallowed pattern")
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("space pattern"));

/// Normalizes a raw proxy name: emoji and separator punctuation become
/// single spaces, the result is trimmed and lowercased.
///
/// The function is idempotent. Its output only contains `[a-z0-9.]`, CJK
/// ideographs and single inner spaces.
pub fn normalize_name(name: &str) -> String {
    let without_emoji = EMOJI.replace_all(name, " ");
    let separated = SEPARATORS.replace_all(&without_emoji, " ");
    let filtered = DISALLOWED.replace_all(&separated, " ");
    let collapsed = WHITESPACE.replace_all(&filtered, " ");

    collapsed.trim().to_ascii_lowercase()
}
