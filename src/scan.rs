//! Filesystem reconciliation.
//!
//! Phase 1 of the build. Compares what a source folder actually contains with
//! what its manifest lists, and appends an entry for every child the manifest
//! does not know yet. Existing entries are never removed or rewritten, so
//! hand-made labels and positions survive every scan.
//!
//! ## Classification
//!
//! Each child of the folder goes through these rules, first match wins:
//!
//! 1. Reserved names are skipped: configured ignore-names, `STRUCTURE.toml`,
//!    `config.toml`, the four HTML fragments, the table-of-contents folder at
//!    the root, and Office lock files (`~$...`).
//! 2. Script/control files (`.py`, `.cmd`, `.bat`) are skipped.
//! 3. A directory becomes a folder entry.
//! 4. A convertible document (`.doc`, `.docx`) becomes a file entry whose
//!    output name is the *derived* document (`Leçon 1.docx` → `lecon_1.pdf`).
//! 5. A derived document whose normalized stem matches a convertible document
//!    in the same folder is skipped: it is the conversion output, already
//!    represented by rule 4.
//! 6. Any other file with an accepted extension becomes a file entry.
//! 7. Everything else is ignored.
//!
//! New entries get consecutive positions starting after the highest position
//! already in use, in listing order (names compared case-insensitively).

use crate::config::{CONFIG_FILENAME, SiteConfig};
use crate::manifest::{MANIFEST_FILENAME, Manifest};
use crate::naming;
use crate::types::{Fragment, Partition};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One child of a source folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    pub name: String,
    pub is_dir: bool,
}

impl Child {
    pub fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_dir: true,
        }
    }

    pub fn file(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_dir: false,
        }
    }
}

/// List the children of `folder`, sorted case-insensitively by name.
///
/// Names that are not valid UTF-8 are skipped with a debug line.
pub fn list_children(folder: &Path) -> std::io::Result<Vec<Child>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            debug!(path = %entry.path().display(), "skipping non UTF-8 name");
            continue;
        };
        let is_dir = entry.file_type()?.is_dir();
        children.push(Child { name, is_dir });
    }
    children.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(children)
}

/// Office writes `~$name.docx` lock files next to open documents.
pub fn is_lock_file(name: &str) -> bool {
    name.starts_with("~$")
}

/// Files the build reads for itself and never publishes or lists.
pub fn is_reserved_file(name: &str) -> bool {
    name == MANIFEST_FILENAME || name == CONFIG_FILENAME || Fragment::is_fragment_file(name)
}

/// Classification settings for one folder.
#[derive(Debug, Clone, Copy)]
pub struct ScanRules<'a> {
    pub config: &'a SiteConfig,
    /// The folder is the source root (its TOC folder is reserved).
    pub is_root: bool,
}

impl<'a> ScanRules<'a> {
    pub fn new(config: &'a SiteConfig, is_root: bool) -> Self {
        Self { config, is_root }
    }

    /// Rule 1: names that never get an entry.
    pub fn is_skipped(&self, child: &Child) -> bool {
        let name = child.name.as_str();
        self.config.is_ignored(name)
            || is_lock_file(name)
            || (!child.is_dir && is_reserved_file(name))
            || (child.is_dir && self.is_root && name == self.config.toc_dir)
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// New entries, in insertion order.
    pub added: Vec<AddedEntry>,
    /// Derived documents skipped because their source is present.
    pub derived_skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedEntry {
    pub partition: Partition,
    pub source_name: String,
    pub output_name: String,
    pub position: i64,
}

impl ScanReport {
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Append an entry to `manifest` for every listed child it does not know.
pub fn reconcile(listing: &[Child], manifest: &mut Manifest, rules: &ScanRules) -> ScanReport {
    let config = rules.config;
    let mut report = ScanReport::default();
    let mut position = manifest.next_position();

    let convertible_stems: HashSet<String> = listing
        .iter()
        .filter(|c| !c.is_dir && !rules.is_skipped(c))
        .filter(|c| config.is_convertible(&naming::extension(&c.name)))
        .map(|c| naming::normalize_name(naming::stem(&c.name)))
        .collect();

    for child in listing {
        if rules.is_skipped(child) {
            continue;
        }

        let name = child.name.as_str();
        let ext = naming::extension(name);

        let (partition, output_name) = if child.is_dir {
            (Partition::Folders, naming::normalize_name(name))
        } else if config.is_script(&ext) {
            continue;
        } else if config.is_convertible(&ext) {
            (
                Partition::Files,
                naming::derived_name(name, &config.derived_extension),
            )
        } else if ext.eq_ignore_ascii_case(&config.derived_extension)
            && convertible_stems.contains(&naming::normalize_name(naming::stem(name)))
        {
            debug!(file = name, "skipping derived document");
            report.derived_skipped.push(name.to_string());
            continue;
        } else if config.is_accepted(&ext) {
            (Partition::Files, naming::normalize_name(name))
        } else {
            continue;
        };

        if manifest.entry_exists(name, partition) {
            continue;
        }

        manifest.add_entry(name, &output_name, partition, position);
        info!(entry = name, output = %output_name, position, "added {partition}");
        report.added.push(AddedEntry {
            partition,
            source_name: name.to_string(),
            output_name,
            position,
        });
        position += 1;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn listing(dirs: &[&str], files: &[&str]) -> Vec<Child> {
        let mut all: Vec<Child> = dirs
            .iter()
            .map(|d| Child::dir(d))
            .chain(files.iter().map(|f| Child::file(f)))
            .collect();
        all.sort_by_key(|c| c.name.to_lowercase());
        all
    }

    fn names(manifest: &Manifest, partition: Partition) -> Vec<&str> {
        manifest
            .entries(partition)
            .iter()
            .map(|e| e.source_name.as_str())
            .collect()
    }

    #[test]
    fn list_children_sorts_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.pdf"), "").unwrap();
        fs::write(tmp.path().join("A.pdf"), "").unwrap();
        fs::create_dir(tmp.path().join("c")).unwrap();

        let children = list_children(tmp.path()).unwrap();
        let got: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(got, vec!["A.pdf", "b.pdf", "c"]);
        assert!(children[2].is_dir);
    }

    #[test]
    fn adds_folders_and_files() {
        let config = SiteConfig::default();
        let mut m = Manifest::default();
        let report = reconcile(
            &listing(&["Cours Été"], &["Notes.txt", "photo.JPG"]),
            &mut m,
            &ScanRules::new(&config, false),
        );

        assert_eq!(report.added.len(), 3);
        assert!(report.changed());
        assert_eq!(names(&m, Partition::Folders), vec!["Cours Été"]);
        assert_eq!(m.folders[0].output_name, "cours_ete");
        assert_eq!(names(&m, Partition::Files), vec!["Notes.txt", "photo.JPG"]);
        assert_eq!(m.files[1].output_name, "photo.jpg");
    }

    #[test]
    fn convertible_maps_to_derived_output() {
        let config = SiteConfig::default();
        let mut m = Manifest::default();
        reconcile(
            &listing(&[], &["Leçon 1.docx"]),
            &mut m,
            &ScanRules::new(&config, false),
        );
        assert_eq!(m.files[0].source_name, "Leçon 1.docx");
        assert_eq!(m.files[0].output_name, "lecon_1.pdf");
    }

    #[test]
    fn derived_duplicate_is_suppressed() {
        let config = SiteConfig::default();
        let mut m = Manifest::default();
        let report = reconcile(
            &listing(&[], &["report.docx", "report.pdf"]),
            &mut m,
            &ScanRules::new(&config, false),
        );
        assert_eq!(names(&m, Partition::Files), vec!["report.docx"]);
        assert_eq!(report.derived_skipped, vec!["report.pdf".to_string()]);
    }

    #[test]
    fn derived_match_uses_normalized_stems() {
        let config = SiteConfig::default();
        let mut m = Manifest::default();
        reconcile(
            &listing(&[], &["Rapport Final.docx", "rapport_final.pdf", "other.pdf"]),
            &mut m,
            &ScanRules::new(&config, false),
        );
        assert_eq!(
            names(&m, Partition::Files),
            vec!["other.pdf", "Rapport Final.docx"]
        );
    }

    #[test]
    fn reserved_and_scripts_are_skipped() {
        let config = SiteConfig::default();
        let mut m = Manifest::default();
        let report = reconcile(
            &listing(
                &["nppBackup", "TDM"],
                &[
                    "STRUCTURE.toml",
                    "config.toml",
                    "entete.html",
                    "pied_general.html",
                    "~$lecon.docx",
                    "build.py",
                    "run.cmd",
                    "archive.zip",
                ],
            ),
            &mut m,
            &ScanRules::new(&config, true),
        );
        assert!(!report.changed());
        assert!(m.folders.is_empty() && m.files.is_empty());
    }

    #[test]
    fn toc_folder_is_only_reserved_at_root() {
        let config = SiteConfig::default();
        let mut m = Manifest::default();
        reconcile(
            &listing(&["TDM"], &[]),
            &mut m,
            &ScanRules::new(&config, false),
        );
        assert_eq!(names(&m, Partition::Folders), vec!["TDM"]);
    }

    #[test]
    fn positions_continue_after_highest() {
        let config = SiteConfig::default();
        let mut m = Manifest::default();
        for (name, pos) in [("a.pdf", 1), ("b.pdf", 3), ("c.pdf", 5)] {
            m.add_entry(name, name, Partition::Files, pos);
        }
        let report = reconcile(
            &listing(&[], &["a.pdf", "b.pdf", "c.pdf", "d.pdf", "e.pdf"]),
            &mut m,
            &ScanRules::new(&config, false),
        );
        let positions: Vec<i64> = report.added.iter().map(|a| a.position).collect();
        assert_eq!(positions, vec![6, 7]);
    }

    #[test]
    fn existing_entries_are_left_untouched() {
        let config = SiteConfig::default();
        let mut m = Manifest::default();
        m.add_entry("a.pdf", "a.pdf", Partition::Files, 4);
        m.files[0].display_name = Some("Custom".into());
        let before = m.clone();

        let report = reconcile(
            &listing(&[], &["a.pdf"]),
            &mut m,
            &ScanRules::new(&config, false),
        );
        assert!(!report.changed());
        assert_eq!(m, before);
    }

    #[test]
    fn stale_entries_are_not_removed() {
        let config = SiteConfig::default();
        let mut m = Manifest::default();
        m.add_entry("gone.pdf", "gone.pdf", Partition::Files, 1);
        reconcile(&[], &mut m, &ScanRules::new(&config, false));
        assert_eq!(names(&m, Partition::Files), vec!["gone.pdf"]);
    }

    #[test]
    fn same_name_can_exist_in_both_partitions() {
        let config = SiteConfig::default();
        let mut m = Manifest::default();
        m.add_entry("notes.txt", "notes.txt", Partition::Files, 1);
        reconcile(
            &listing(&["notes.txt"], &[]),
            &mut m,
            &ScanRules::new(&config, false),
        );
        assert!(m.entry_exists("notes.txt", Partition::Folders));
    }
}
