//! Reversible mapping between logical cache keys and storage-safe keys
//!
//! Logical keys carry labels, chain separators, and country names, any of
//! which may contain characters the storage backend treats as path syntax or
//! wildcards. Each reserved character is rewritten to a fixed textual marker
//! on the way in and restored on the way out.
//!
//! The marker alphabet uses only ASCII letters and underscores, so encoding
//! passes never interfere with each other. A raw label that already contains
//! a literal marker substring (e.g. a user typed `__slash__`) decodes
//! ambiguously; this is a documented, accepted edge-case risk. Encoding
//! never rejects such input, but [`is_ambiguous`] lets callers log it.

/// Reserved characters and their out-of-band textual markers.
///
/// Covers path separators, key-path syntax, brackets/braces, and wildcards.
const MARKERS: &[(char, &str)] = &[
    ('/', "__slash__"),
    ('.', "__dot__"),
    ('#', "__hash__"),
    ('$', "__dollar__"),
    ('[', "__lbracket__"),
    (']', "__rbracket__"),
    ('{', "__lbrace__"),
    ('}', "__rbrace__"),
    ('*', "__star__"),
];

/// Encode a logical key into a storage-safe key.
pub fn encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match MARKERS.iter().find(|(reserved, _)| *reserved == c) {
            Some((_, marker)) => out.push_str(marker),
            None => out.push(c),
        }
    }
    out
}

/// Decode a storage-safe key back into its logical form.
pub fn decode(safe: &str) -> String {
    let mut out = safe.to_string();
    for (reserved, marker) in MARKERS {
        out = out.replace(marker, &reserved.to_string());
    }
    out
}

/// Whether a raw string contains a literal marker substring, which would
/// make its round-trip ambiguous. Exposed so callers can log the condition.
pub fn is_ambiguous(raw: &str) -> bool {
    MARKERS.iter().any(|(_, marker)| raw.contains(marker))
}
