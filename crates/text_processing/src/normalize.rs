//! Question normalization
//!
//! Canonical form used for cache keys and every keyword comparison:
//! NFD-decomposed with combining marks dropped, lowercased, punctuation
//! removed, word separators turned into spaces, whitespace collapsed.
//! `normalize(normalize(x)) == normalize(x)` for every input.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Characters that split words rather than disappear ("san-juan" → "san juan")
fn is_separator(c: char) -> bool {
    matches!(c, '-' | '_' | '/' | '\\' | '|' | '+' | '&')
}

/// Canonicalize a raw user string
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // start as if preceded by a space so leading whitespace is dropped
    let mut pending_space = false;

    for c in text.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_whitespace() || is_separator(c) {
            pending_space = !out.is_empty();
            continue;
        }
        if !c.is_alphanumeric() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.extend(c.to_lowercase());
    }

    out
}

/// Split normalized text into tokens
pub fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

/// Number of characters after trimming, as a user would count them
pub fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}
