//! Batch fix-up of existing manifests.
//!
//! The build never removes an entry, so two kinds of debris accumulate in
//! manifests written by older tooling or by hand:
//!
//! - **Derived duplicates**: a file entry for `report.pdf` next to the entry
//!   for `report.docx` it was converted from. The PDF is already published
//!   through the DOCX entry, so the duplicate is removed.
//! - **`idem` labels**: a literal `"idem"` in `display_name`, `toc_name` or
//!   `nav_name`, meaning "same as the file name". It is replaced with
//!   `{{source_stem}}`.
//!
//! Manifests that cannot be parsed are reported and left untouched; unlike
//! the build, repair never degrades a corrupt file to an empty skeleton.

use crate::config::SiteConfig;
use crate::manifest::{Entry, MANIFEST_FILENAME, Manifest, ManifestError};
use crate::naming;
use crate::scan;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RepairError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

const IDEM: &str = "idem";
const IDEM_REPLACEMENT: &str = "{{source_stem}}";

/// Changes made (or proposed, in a dry run) to one manifest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FolderRepair {
    /// Folder, relative to the source root.
    pub folder: PathBuf,
    pub duplicates_removed: Vec<String>,
    /// Entries that had at least one `idem` label replaced.
    pub idem_replaced: Vec<String>,
    pub saved: bool,
}

impl FolderRepair {
    pub fn changes(&self) -> usize {
        self.duplicates_removed.len() + self.idem_replaced.len()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepairSummary {
    pub scanned: usize,
    pub folders: Vec<FolderRepair>,
    /// Manifests that could not be parsed, with the error message.
    pub corrupt: Vec<(PathBuf, String)>,
}

impl RepairSummary {
    pub fn duplicates_removed(&self) -> usize {
        self.folders.iter().map(|f| f.duplicates_removed.len()).sum()
    }

    pub fn idem_replaced(&self) -> usize {
        self.folders.iter().map(|f| f.idem_replaced.len()).sum()
    }
}

/// Normalized stems of the convertible documents present in `folder`.
fn convertible_stems(folder: &Path, config: &SiteConfig) -> std::io::Result<HashSet<String>> {
    Ok(scan::list_children(folder)?
        .into_iter()
        .filter(|c| !c.is_dir && config.is_convertible(&naming::extension(&c.name)))
        .map(|c| naming::normalize_name(naming::stem(&c.name)))
        .collect())
}

fn replace_idem(entry: &mut Entry) -> bool {
    let mut changed = false;
    for field in [
        &mut entry.display_name,
        &mut entry.toc_name,
        &mut entry.nav_name,
    ] {
        if field.as_deref().map(str::trim) == Some(IDEM) {
            *field = Some(IDEM_REPLACEMENT.to_string());
            changed = true;
        }
    }
    changed
}

/// Apply both fixes to `manifest`. `stems` are the normalized stems of the
/// convertible documents on disk next to it.
pub fn repair_manifest(
    manifest: &mut Manifest,
    stems: &HashSet<String>,
    derived_extension: &str,
) -> FolderRepair {
    let mut repair = FolderRepair::default();

    manifest.files.retain(|entry| {
        let name = &entry.source_name;
        let duplicate = naming::extension(name).eq_ignore_ascii_case(derived_extension)
            && stems.contains(&naming::normalize_name(naming::stem(name)));
        if duplicate {
            repair.duplicates_removed.push(name.clone());
        }
        !duplicate
    });

    for entry in manifest.folders.iter_mut().chain(manifest.files.iter_mut()) {
        if replace_idem(entry) {
            repair.idem_replaced.push(entry.source_name.clone());
        }
    }

    repair
}

/// Repair every manifest under `root`.
pub fn repair_tree(
    root: &Path,
    config: &SiteConfig,
    dry_run: bool,
) -> Result<RepairSummary, RepairError> {
    let mut summary = RepairSummary::default();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !config.is_ignored(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_dir() || !entry.path().join(MANIFEST_FILENAME).is_file() {
            continue;
        }
        let folder = entry.path();
        let rel = folder.strip_prefix(root).unwrap_or(folder).to_path_buf();
        summary.scanned += 1;

        let mut manifest = match Manifest::try_load(folder) {
            Ok(Some(m)) => m,
            Ok(None) => continue,
            Err(e) => {
                warn!(folder = %rel.display(), "manifest not repaired: {e}");
                summary.corrupt.push((rel, e.to_string()));
                continue;
            }
        };

        let stems = convertible_stems(folder, config)?;
        let mut repair = repair_manifest(&mut manifest, &stems, &config.derived_extension);
        repair.folder = rel;

        if repair.changes() == 0 {
            continue;
        }
        for name in &repair.duplicates_removed {
            info!(folder = %repair.folder.display(), entry = %name, "derived duplicate removed");
        }
        for name in &repair.idem_replaced {
            info!(folder = %repair.folder.display(), entry = %name, "idem label replaced");
        }
        if dry_run {
            info!(folder = %repair.folder.display(), changes = repair.changes(), "[DRY-RUN] not saved");
        } else {
            manifest.save(folder)?;
            repair.saved = true;
        }
        summary.folders.push(repair);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use crate::types::Partition;
    use std::fs;
    use tempfile::TempDir;

    fn stems(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn removes_pdf_matching_a_convertible() {
        let mut m = Manifest::default();
        m.add_entry("Rapport Final.docx", "rapport_final.pdf", Partition::Files, 1);
        m.add_entry("rapport_final.pdf", "rapport_final.pdf", Partition::Files, 2);
        m.add_entry("other.pdf", "other.pdf", Partition::Files, 3);

        let repair = repair_manifest(&mut m, &stems(&["rapport_final"]), "pdf");

        assert_eq!(repair.duplicates_removed, vec!["rapport_final.pdf".to_string()]);
        assert_eq!(
            source_names(&m, Partition::Files),
            vec!["Rapport Final.docx", "other.pdf"]
        );
    }

    #[test]
    fn replaces_idem_in_every_label() {
        let mut m = Manifest::default();
        m.add_entry("Cours", "cours", Partition::Folders, 1);
        m.folders[0].nav_name = Some("idem".into());
        m.add_entry("a.pdf", "a.pdf", Partition::Files, 2);
        m.files[0].display_name = Some("idem".into());
        m.files[0].toc_name = Some("Custom".into());

        let repair = repair_manifest(&mut m, &HashSet::new(), "pdf");

        assert_eq!(repair.idem_replaced.len(), 2);
        assert_eq!(m.folders[0].nav_name.as_deref(), Some("{{source_stem}}"));
        assert_eq!(m.files[0].display_name.as_deref(), Some("{{source_stem}}"));
        assert_eq!(m.files[0].toc_name.as_deref(), Some("Custom"));
    }

    #[test]
    fn repair_tree_saves_changes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "a.docx");
        touch(root, "a.pdf");
        let mut m = Manifest::default();
        m.add_entry("a.docx", "a.pdf", Partition::Files, 1);
        m.add_entry("a.pdf", "a.pdf", Partition::Files, 2);
        m.save(root).unwrap();

        let summary = repair_tree(root, &SiteConfig::default(), false).unwrap();

        assert_eq!(summary.duplicates_removed(), 1);
        assert!(summary.folders[0].saved);
        let m = Manifest::load(root);
        assert_eq!(source_names(&m, Partition::Files), vec!["a.docx"]);
    }

    #[test]
    fn dry_run_leaves_files_alone() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let mut m = Manifest::default();
        m.add_entry("a.pdf", "a.pdf", Partition::Files, 1);
        m.files[0].display_name = Some("idem".into());
        m.save(root).unwrap();
        let before = fs::read_to_string(root.join(MANIFEST_FILENAME)).unwrap();

        let summary = repair_tree(root, &SiteConfig::default(), true).unwrap();

        assert_eq!(summary.idem_replaced(), 1);
        assert!(!summary.folders[0].saved);
        let after = fs::read_to_string(root.join(MANIFEST_FILENAME)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn corrupt_manifests_are_reported_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "Sub/STRUCTURE.toml", "not [valid");

        let summary = repair_tree(root, &SiteConfig::default(), false).unwrap();

        assert_eq!(summary.corrupt.len(), 1);
        assert_eq!(summary.corrupt[0].0, PathBuf::from("Sub"));
        let text = fs::read_to_string(root.join("Sub/STRUCTURE.toml")).unwrap();
        assert_eq!(text, "not [valid");
    }

    #[test]
    fn clean_manifests_are_not_listed() {
        let tmp = setup_site();
        let summary = repair_tree(tmp.path(), &SiteConfig::default(), false).unwrap();
        assert_eq!(summary.scanned, 3);
        assert!(summary.folders.is_empty());
    }
}
