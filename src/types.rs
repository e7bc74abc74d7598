//! Shared types used across the pipeline stages.

use std::fmt;

/// The two partitions of a folder manifest.
///
/// Rendering merges both partitions into one list ordered by position; the
/// partition then only decides the link shape and the decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    /// Subfolders, linked as `<output_name>/index.html`.
    Folders,
    /// Documents, linked as `<output_name>`.
    Files,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Folders => write!(f, "folder"),
            Partition::Files => write!(f, "file"),
        }
    }
}

/// Hand-written HTML fragments a folder may carry next to its documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    /// `entete_general.html`, falls back to the source root copy.
    SiteHeader,
    /// `pied_general.html`, falls back to the source root copy.
    SiteFooter,
    /// `entete.html`, this folder only.
    Header,
    /// `pied.html`, this folder only.
    Footer,
}

impl Fragment {
    pub const ALL: [Fragment; 4] = [
        Fragment::SiteHeader,
        Fragment::SiteFooter,
        Fragment::Header,
        Fragment::Footer,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Fragment::SiteHeader => "entete_general.html",
            Fragment::SiteFooter => "pied_general.html",
            Fragment::Header => "entete.html",
            Fragment::Footer => "pied.html",
        }
    }

    /// Site-wide fragments are looked up in the source root when a folder
    /// has no copy of its own.
    pub fn is_site_wide(self) -> bool {
        matches!(self, Fragment::SiteHeader | Fragment::SiteFooter)
    }

    pub fn is_fragment_file(name: &str) -> bool {
        Self::ALL.iter().any(|f| f.file_name() == name)
    }
}
