//! Per-folder manifest store (`STRUCTURE.toml`).
//!
//! Every source folder owns one manifest describing what its index page shows
//! and in which order. The file is created as an empty skeleton the first time
//! a folder is scanned, enriched with an entry for every new document on later
//! scans, and hand-edited by the site's authors in between. The build never
//! removes or rewrites an entry.
//!
//! ```toml
//! # Generated by docsite. Entries are matched on source_name; ...
//! folder_title = "Grammaire"
//! table_title = "{{folder_title}}"
//! show_site_header = true
//!
//! [[dossiers]]
//! source_name = "Verbes forts"
//! output_name = "verbes_forts"
//! display_name = "{{source_stem}}"
//! position = 1
//!
//! [[fichiers]]
//! source_name = "Leçon 1.docx"
//! output_name = "lecon_1.pdf"
//! display_name = "{{source_stem}}"
//! position = 2
//! ```
//!
//! Display fields are templates (see [`crate::template`]) and are stored
//! verbatim. Keys this crate does not know are kept in `extra` and written
//! back on save.

use crate::types::Partition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// File name of a folder manifest.
pub const MANIFEST_FILENAME: &str = "STRUCTURE.toml";

/// Sort key used for entries without a position.
pub const POSITION_FALLBACK: i64 = 9999;

const HEADER: &str = "# Generated by docsite. Entries are matched on source_name; \
labels, flags and positions may be edited freely.\n\n";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn yes() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

/// One document or subfolder listed in a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Name on disk. Never rewritten once the entry exists.
    pub source_name: String,
    /// Normalized name in the output tree.
    #[serde(default)]
    pub output_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toc_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nav_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_title: Option<String>,
    #[serde(default = "yes")]
    pub apply_decoration: bool,
    #[serde(default = "yes")]
    pub show_in_index: bool,
    #[serde(default = "yes")]
    pub show_in_toc: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, toml::Value>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            source_name: String::new(),
            output_name: String::new(),
            display_name: None,
            toc_name: None,
            nav_name: None,
            table_title: None,
            apply_decoration: true,
            show_in_index: true,
            show_in_toc: true,
            position: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Entry {
    pub fn sort_key(&self) -> i64 {
        self.position.unwrap_or(POSITION_FALLBACK)
    }
}

/// The manifest of one folder.
///
/// Folder-level settings are optional so that hand-written manifests stay
/// short; [`Manifest::apply_defaults`] fills in whatever is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_site_header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_site_footer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_footer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_navigation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_page_top: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_page_bottom: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_decoration: Option<bool>,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, toml::Value>,
    #[serde(rename = "dossiers", alias = "folders", default)]
    pub folders: Vec<Entry>,
    #[serde(rename = "fichiers", alias = "files", default)]
    pub files: Vec<Entry>,
}

/// Entry of either partition, as merged for rendering.
#[derive(Debug, Clone, Copy)]
pub struct Tagged<'a> {
    pub partition: Partition,
    pub entry: &'a Entry,
}

impl Manifest {
    /// Parse a manifest from TOML text.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ManifestError> {
        toml::from_str(text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the manifest of `folder`, or `None` when the file does not exist.
    pub fn try_load(folder: &Path) -> Result<Option<Self>, ManifestError> {
        let path = folder.join(MANIFEST_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        Self::from_toml(&text, &path).map(Some)
    }

    /// Load the manifest of `folder`, degrading to an empty skeleton.
    ///
    /// A missing file is normal (first scan). An unreadable or unparseable
    /// file is logged and treated as empty; the next save overwrites it.
    pub fn load(folder: &Path) -> Self {
        match Self::try_load(folder) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(folder = %folder.display(), "manifest unusable, starting empty: {e}");
                Self::default()
            }
        }
    }

    /// Fill in missing folder-level settings. Existing values are kept.
    ///
    /// Returns `true` when anything was injected.
    pub fn apply_defaults(&mut self, folder_name: &str, is_root: bool, site_title: &str) -> bool {
        let mut changed = false;

        if self.folder_title.is_none() {
            let title = if is_root { site_title } else { folder_name };
            self.folder_title = Some(title.to_string());
            changed = true;
        }
        if self.table_title.is_none() {
            self.table_title = Some("{{folder_title}}".to_string());
            changed = true;
        }

        for flag in [
            &mut self.show_site_header,
            &mut self.show_site_footer,
            &mut self.show_header,
            &mut self.show_footer,
            &mut self.show_navigation,
            &mut self.show_page_top,
            &mut self.show_page_bottom,
            &mut self.apply_decoration,
        ] {
            if flag.is_none() {
                *flag = Some(true);
                changed = true;
            }
        }

        changed
    }

    pub fn entries(&self, partition: Partition) -> &[Entry] {
        match partition {
            Partition::Folders => &self.folders,
            Partition::Files => &self.files,
        }
    }

    pub fn entries_mut(&mut self, partition: Partition) -> &mut Vec<Entry> {
        match partition {
            Partition::Folders => &mut self.folders,
            Partition::Files => &mut self.files,
        }
    }

    /// Position for the next appended entry: one past the highest in use.
    pub fn next_position(&self) -> i64 {
        self.folders
            .iter()
            .chain(&self.files)
            .map(|e| e.position.unwrap_or(0))
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn entry_exists(&self, source_name: &str, partition: Partition) -> bool {
        self.entries(partition)
            .iter()
            .any(|e| e.source_name == source_name)
    }

    /// Append a new entry with the stock templates and every flag on.
    pub fn add_entry(
        &mut self,
        source_name: &str,
        output_name: &str,
        partition: Partition,
        position: i64,
    ) -> &Entry {
        let entry = Entry {
            source_name: source_name.to_string(),
            output_name: output_name.to_string(),
            display_name: Some("{{source_stem}}".to_string()),
            toc_name: Some("{{source_stem}}".to_string()),
            nav_name: (partition == Partition::Folders).then(|| "{{source_name}}".to_string()),
            position: Some(position),
            ..Entry::default()
        };
        let list = self.entries_mut(partition);
        list.push(entry);
        &list[list.len() - 1]
    }

    /// Both partitions merged and stable-sorted by position.
    ///
    /// Folders come before files among equal positions.
    pub fn ordered(&self) -> Vec<Tagged<'_>> {
        let mut all: Vec<Tagged<'_>> = self
            .folders
            .iter()
            .map(|entry| Tagged {
                partition: Partition::Folders,
                entry,
            })
            .chain(self.files.iter().map(|entry| Tagged {
                partition: Partition::Files,
                entry,
            }))
            .collect();
        all.sort_by_key(|t| t.entry.sort_key());
        all
    }

    /// Serialize with the generated-file header. Does not reorder.
    pub fn to_toml(&self) -> Result<String, ManifestError> {
        Ok(format!("{HEADER}{}", toml::to_string(self)?))
    }

    /// Sort both partitions by position and write `STRUCTURE.toml`.
    pub fn save(&mut self, folder: &Path) -> Result<(), ManifestError> {
        self.folders.sort_by_key(Entry::sort_key);
        self.files.sort_by_key(Entry::sort_key);
        fs::write(folder.join(MANIFEST_FILENAME), self.to_toml()?)?;
        Ok(())
    }
}
