//! Centralized name handling for the source → output mapping.
//!
//! Source names are kept exactly as they appear on disk; they are the keys of
//! every manifest entry. Output names go through [`normalize_name`] so that
//! the published tree only contains lowercase, accent-free, space-free paths:
//!
//! - `Leçon 1.docx` → `lecon_1.docx`
//! - `L'alphabet` → `l_alphabet`
//! - `Été/Révision.pdf` → `ete/revision.pdf` (per segment, see [`normalize_path`])
//!
//! The same normalization is used to match a derived PDF against its DOCX
//! source, so `Rapport Final.docx` and `rapport_final.pdf` are recognized as
//! one document.

use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Normalize a single name for use in output paths and duplicate matching.
///
/// Decomposes to NFD, drops combining marks, turns apostrophes (straight and
/// typographic) and spaces into underscores, then lowercases.
pub fn normalize_name(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            '\'' | '\u{2019}' | ' ' => '_',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}

/// Normalize every component of a relative path.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .map(|c| normalize_name(&c.as_os_str().to_string_lossy()))
        .collect()
}

/// File name without its last extension (`report.final.docx` → `report.final`).
pub fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(pos) => &name[..pos],
    }
}

/// Lowercased last extension without the dot, empty when there is none.
pub fn extension(name: &str) -> String {
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(pos) => name[pos + 1..].to_lowercase(),
    }
}

/// Output name of the document derived from a convertible source.
///
/// `Leçon 3.docx` with derived extension `pdf` → `lecon_3.pdf`.
pub fn derived_name(source_name: &str, derived_extension: &str) -> String {
    normalize_name(&format!("{}.{}", stem(source_name), derived_extension))
}
