use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

/// Prefix used when the caller does not pick one
pub const DEFAULT_PREFIX: &str = "label";

// Invalid characters for Windows: < > : " / \ | ? *
// Also remove control characters (0-31)
static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("valid filename regex"));

static RESERVED_NAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])$").expect("valid reserved-name regex")
});

/// Sanitize a filename for cross-platform compatibility
/// Removes/replaces characters that are invalid on Windows, macOS, or Linux
pub fn sanitize_filename(name: &str) -> String {
    let sanitized = INVALID_CHARS.replace_all(name, "_");

    // Trim leading/trailing spaces and dots (problematic on Windows)
    let sanitized = sanitized.trim_matches(|c| c == ' ' || c == '.');

    if RESERVED_NAMES.is_match(sanitized) {
        return format!("_{sanitized}");
    }

    // Leave room for the timestamp and extension
    let sanitized: String = sanitized.chars().take(200).collect();

    if sanitized.is_empty() {
        DEFAULT_PREFIX.to_string()
    } else {
        sanitized
    }
}

/// `{prefix}_{YYYYMMDDHHMMSS}.pdf`, sortable by creation time
pub fn timestamp_filename(prefix: &str, at: NaiveDateTime) -> String {
    format!(
        "{}_{}.pdf",
        sanitize_filename(prefix),
        at.format("%Y%m%d%H%M%S")
    )
}
