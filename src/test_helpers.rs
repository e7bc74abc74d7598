//! Shared test utilities for the docsite test suite.
//!
//! Builds small source trees in temp directories and provides lookup helpers
//! over manifests that panic with a clear message on miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_site();
//! let manifest = Manifest::load(&tmp.path().join("Cours"));
//! let entry = find_entry(&manifest, "Leçon 1.docx");
//! assert_eq!(entry.output_name, "lecon_1.pdf");
//! ```

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::manifest::{Entry, Manifest};
use crate::types::Partition;

// =========================================================================
// Fixture setup
// =========================================================================

/// Write `content` to `rel` under `root`, creating parent folders.
pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Create an empty file at `rel` under `root`.
pub fn touch(root: &Path, rel: &str) {
    write(root, rel, "");
}

/// Create the folder `rel` (and its parents) under `root`.
pub fn mkdir(root: &Path, rel: &str) {
    fs::create_dir_all(root.join(rel)).unwrap();
}

/// A small reconciled source tree:
///
/// ```text
/// root/
/// ├── STRUCTURE.toml             # Cours (1), intro.pdf (2)
/// ├── entete_general.html
/// ├── intro.pdf
/// └── Cours/
///     ├── STRUCTURE.toml         # Leçon 1.docx (1), Grammaire (2)
///     ├── Leçon 1.docx
///     ├── lecon_1.pdf            # derived from Leçon 1.docx
///     └── Grammaire/
///         ├── STRUCTURE.toml     # verbes.pdf (1)
///         └── verbes.pdf
/// ```
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write(root, "entete_general.html", "<header>{{BASE_PATH}}</header>");
    touch(root, "intro.pdf");
    touch(root, "Cours/Leçon 1.docx");
    touch(root, "Cours/lecon_1.pdf");
    touch(root, "Cours/Grammaire/verbes.pdf");

    let mut m = Manifest::default();
    m.apply_defaults("", true, "Documentation");
    m.add_entry("Cours", "cours", Partition::Folders, 1);
    m.add_entry("intro.pdf", "intro.pdf", Partition::Files, 2);
    m.save(root).unwrap();

    let mut m = Manifest::default();
    m.apply_defaults("Cours", false, "Documentation");
    m.add_entry("Leçon 1.docx", "lecon_1.pdf", Partition::Files, 1);
    m.add_entry("Grammaire", "grammaire", Partition::Folders, 2);
    m.save(&root.join("Cours")).unwrap();

    let mut m = Manifest::default();
    m.apply_defaults("Grammaire", false, "Documentation");
    m.add_entry("verbes.pdf", "verbes.pdf", Partition::Files, 1);
    m.save(&root.join("Cours/Grammaire")).unwrap();

    tmp
}

// =========================================================================
// Manifest lookups
// =========================================================================

/// Find an entry by source name in either partition. Panics if not found.
pub fn find_entry<'a>(manifest: &'a Manifest, source_name: &str) -> &'a Entry {
    manifest
        .folders
        .iter()
        .chain(&manifest.files)
        .find(|e| e.source_name == source_name)
        .unwrap_or_else(|| {
            let names: Vec<&str> = manifest
                .folders
                .iter()
                .chain(&manifest.files)
                .map(|e| e.source_name.as_str())
                .collect();
            panic!("entry '{source_name}' not found. Available: {names:?}")
        })
}

/// Source names of one partition, in stored order.
pub fn source_names(manifest: &Manifest, partition: Partition) -> Vec<&str> {
    manifest
        .entries(partition)
        .iter()
        .map(|e| e.source_name.as_str())
        .collect()
}
