//! Cross-platform file name sanitization.
//!
//! Record titles are free text and routinely contain characters Windows
//! refuses (`?`, `:`, `|`). CJK text is left untouched.

const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_forbidden(c: char) -> bool {
    c.is_control() || WINDOWS_INVALID_CHARS.contains(&c)
}

fn is_reserved(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    WINDOWS_RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
}

/// Make `input` safe to use as a single path component on every platform.
///
/// Runs of forbidden characters become one `_`, leading and trailing spaces
/// and dots are dropped, Windows device names get a `_` prefix, and an empty
/// result becomes `unnamed`.
///
/// ```
/// use replay_fetch::utils::filename::sanitize_filename;
///
/// assert_eq!(sanitize_filename("10:00 | 杂谈?"), "10_00 _ 杂谈_");
/// assert_eq!(sanitize_filename("nul.mp4"), "_nul.mp4");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if !is_forbidden(c) {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches([' ', '.']);
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else if is_reserved(trimmed) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}
