//! Filename sanitisation for user-supplied entry names.

use crate::error::{FsOpsError, FsOpsResult};

/// Longest filename accepted, in bytes.
pub const MAX_FILENAME_BYTES: usize = 255;

const REPLACED_CHARS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];

const RESERVED_STEMS: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Clean a single path segment supplied by a client.
///
/// Control and invisible formatting characters are stripped, characters that
/// are illegal on common filesystems are replaced with `_`, and the result is
/// truncated to [`MAX_FILENAME_BYTES`] on a character boundary. Names that
/// contain a path separator, are hidden (unless `allow_hidden`), are Windows
/// device names, or are `.`/`..` are rejected.
///
/// # Errors
///
/// Returns [`FsOpsError::InvalidFilename`] describing the first rule violated.
pub fn sanitize_filename(name: &str, allow_hidden: bool) -> FsOpsResult<String> {
    let invalid = |reason: &'static str| FsOpsError::InvalidFilename {
        name: name.to_string(),
        reason,
    };

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(invalid("filename cannot be empty"));
    }
    if trimmed.contains('\0') {
        return Err(invalid("filename contains null bytes"));
    }
    if trimmed.contains(['/', '\\']) {
        return Err(invalid("filename cannot contain path separators"));
    }

    let replaced: String = trimmed
        .chars()
        .filter(|ch| !ch.is_control() && !is_invisible(*ch))
        .map(|ch| if REPLACED_CHARS.contains(&ch) { '_' } else { ch })
        .collect();
    let mut cleaned = replaced.trim().to_string();
    if cleaned.is_empty() {
        return Err(invalid("filename is invalid after sanitization"));
    }

    let fitted = truncate_bytes(&cleaned, MAX_FILENAME_BYTES).len();
    cleaned.truncate(fitted);

    if cleaned == "." || cleaned == ".." {
        return Err(invalid("filename cannot be current or parent directory"));
    }
    if cleaned.starts_with('.') && !allow_hidden {
        return Err(invalid("hidden filenames are not allowed"));
    }

    let stem = cleaned.split('.').next().unwrap_or_default();
    if RESERVED_STEMS
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        return Err(invalid("reserved filename is not allowed"));
    }

    Ok(cleaned)
}

/// Longest prefix of `text` that fits in `max` bytes without splitting a character.
pub(crate) fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

/// Zero-width, joiner, bidi-control and BOM characters that render as nothing.
const fn is_invisible(ch: char) -> bool {
    matches!(
        ch,
        '\u{00AD}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
    )
}
