//! Shared utility functions used across multiple modules.

use std::sync::OnceLock;

use regex::Regex;

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Check that `value` is exactly `len` ASCII hex digits.
pub fn is_hex_of_len(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Replace anything outside `[a-zA-Z0-9._-]` with `_` so a game title can be
/// used as a file stem.
pub fn sanitize_file_stem(title: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9._-]").expect("Invalid regex"));
    re.replace_all(title, "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" /sdcard ".to_string())),
            Some("/sdcard".to_string())
        );
    }

    #[test]
    fn hex_length_is_exact() {
        assert!(is_hex_of_len("0100ABCD12345000", 16));
        assert!(!is_hex_of_len("0100ABCD1234500", 16));
        assert!(!is_hex_of_len("0100ABCD1234500G", 16));
    }

    #[test]
    fn sanitize_file_stem_replaces_unsafe_chars() {
        assert_eq!(
            sanitize_file_stem("Zelda: Link's Awakening (DX)"),
            "Zelda__Link_s_Awakening__DX_"
        );
        assert_eq!(sanitize_file_stem("metroid-1.0_b"), "metroid-1.0_b");
    }
}
