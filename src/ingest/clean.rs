//! Text cleaning and normalization
//!
//! Real-world framework exports carry non-breaking spaces, zero-width
//! characters, and mixed line endings in both cell values and column
//! headers. Every scalar that enters a canonical frame passes through
//! [`clean_text`] first so that natural keys compare reliably.

use unicode_normalization::UnicodeNormalization;

/// Clean and normalize a text value.
///
/// Returns `None` when the input is blank after cleaning, so callers can
/// treat "empty cell" and "whitespace-only cell" identically.
pub fn clean_text(val: &str) -> Option<String> {
    if val.is_empty() {
        return None;
    }

    let mut s = String::with_capacity(val.len());
    for ch in val.chars() {
        match ch {
            // Non-breaking space, en space, em space, thin space
            '\u{00a0}' | '\u{2002}' | '\u{2003}' | '\u{2009}' => s.push(' '),
            // Zero-width space is dropped entirely
            '\u{200b}' => {}
            _ => s.push(ch),
        }
    }

    // Normalize line endings before unicode normalization
    let s = s.replace("\r\n", "\n").replace('\r', "\n");

    // NFKC: compatibility decomposition followed by canonical composition
    let s: String = s.nfkc().collect();

    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Clean an optional value, collapsing blank results to `None`.
pub fn clean_opt(val: Option<&str>) -> Option<String> {
    val.and_then(clean_text)
}

/// Split a delimited reference list into cleaned parts.
///
/// Splits on newlines, commas, semicolons, and pipes; blank parts are
/// dropped. Used for evidence artifact lists and framework-reference cells.
pub fn split_list_string(s: &str) -> Vec<String> {
    let Some(cleaned) = clean_text(s) else {
        return Vec::new();
    };

    cleaned
        .split(['\n', '\r', ',', ';', '|'])
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                None
            } else {
                Some(part.to_string())
            }
        })
        .collect()
}
