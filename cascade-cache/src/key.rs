//! Logical cache-key derivation
//!
//! Three key families, matching the three caches:
//!
//! - expansion keys are context-sensitive: label + ordered ancestor chain +
//!   country. The same label reached through different cascade paths gets a
//!   distinct entry.
//! - narrative and severity keys are label-only. Two paths that reuse a
//!   label share narrative and severity content. This asymmetry mirrors the
//!   observed product behavior and is kept on purpose.
//!
//! Keys are logical: they may contain any label text. Encode them with
//! [`crate::codec`] before handing them to a storage backend.

/// Separator between the label, chain, and country sections of a key.
const SECTION: &str = "::";

/// Separator between labels inside the ancestor chain, oldest first.
const CHAIN: &str = ">";

/// Derive the expansion-cache key for (label, ancestor chain, country).
///
/// The chain is ordered oldest-first and excludes both the root's label and
/// the node's own label. `None` country and empty chain are represented by
/// empty sections so the key always has exactly three sections.
pub fn expansion_key(label: &str, chain: &[String], country: Option<&str>) -> String {
    format!(
        "{label}{SECTION}{}{SECTION}{}",
        chain.join(CHAIN),
        country.unwrap_or_default()
    )
}

/// Derive the narrative-cache key. Label-only by design.
pub fn narrative_key(label: &str) -> String {
    label.to_string()
}

/// Derive the severity-cache key. Label-only by design.
pub fn severity_key(label: &str) -> String {
    label.to_string()
}
