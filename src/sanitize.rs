//! Latin-script filtering for free-text fields.
//!
//! The dump mixes arbitrary scripts. Descriptive fields are filtered down to the
//! Latin blocks plus a small punctuation allow-list; anything else is dropped
//! silently. A field that ends up blank becomes `None` so callers have to handle
//! the omission explicitly.

/// Inclusive code point ranges treated as Latin script.
pub const LATIN_RANGES: &[(u32, u32)] = &[
    (0x0000, 0x007F), // Basic Latin
    (0x0080, 0x00FF), // Latin-1 Supplement
    (0x0100, 0x017F), // Latin Extended-A
    (0x0180, 0x024F), // Latin Extended-B
    (0x1E00, 0x1EFF), // Latin Extended Additional
    (0x2C60, 0x2C7F), // Latin Extended-C
    (0xA720, 0xA7FF), // Latin Extended-D
    (0xAB30, 0xAB6F), // Latin Extended-E
];

/// Characters kept regardless of the Latin ranges.
const ALLOWED_EXTRA: &str = " .,;:!?'\"-_()[]{}/\\@#$%&*+=0123456789\n\t";

pub fn is_latin_char(c: char) -> bool {
    let code = c as u32;
    LATIN_RANGES
        .iter()
        .any(|&(start, end)| start <= code && code <= end)
}

fn is_allowed(c: char) -> bool {
    is_latin_char(c) || ALLOWED_EXTRA.contains(c)
}

/// Keep only allowed characters, trim, and map an empty result to `None`.
///
/// The filter is a fixed point: `sanitize_latin_text` applied to its own output
/// returns the same value.
pub fn sanitize_latin_text(text: &str) -> Option<String> {
    let filtered: String = text.chars().filter(|&c| is_allowed(c)).collect();
    let trimmed = filtered.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// [`sanitize_latin_text`] lifted over an optional field.
pub fn sanitize_field(text: Option<&str>) -> Option<String> {
    text.and_then(sanitize_latin_text)
}
