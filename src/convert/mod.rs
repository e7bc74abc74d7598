//! Offline conversion of word-processor documents.
//!
//! | Module | Role |
//! |--------|------|
//! | [`policy`] | Pure regeneration decision (absent, forced, since-date, ...) |
//! | [`backend`] | [`Converter`] trait and the headless office-suite implementation |
//!
//! [`convert_folder`] ties them together for one source folder and
//! [`convert_standalone`] runs it outside a build. The derived
//! document is written next to its source, under the normalized name the
//! manifest entry points at (`Leçon 1.docx` → `lecon_1.pdf`), so the copy
//! phase later publishes it like any other file.

pub mod backend;
pub mod policy;

pub use backend::{CommandConverter, ConvertError, Converter};
pub use policy::{Decision, Reason, decide, should_regenerate};

use crate::config::SiteConfig;
use crate::naming;
use crate::scan::{self, Child, is_lock_file};
use std::path::Path;
use tracing::{debug, info, warn};

/// Counters for one folder (or a whole run, see [`ConversionStats::add`]).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConversionStats {
    pub converted: usize,
    pub up_to_date: usize,
    pub failed: usize,
}

impl ConversionStats {
    pub fn add(&mut self, other: ConversionStats) {
        self.converted += other.converted;
        self.up_to_date += other.up_to_date;
        self.failed += other.failed;
    }
}

/// Convert every convertible document of `folder` that needs it.
///
/// Failures are logged and counted; the batch always runs to the end.
pub fn convert_folder(
    folder: &Path,
    listing: &[Child],
    converter: &dyn Converter,
    config: &SiteConfig,
) -> ConversionStats {
    let mut stats = ConversionStats::default();

    let sources = listing.iter().filter(|c| {
        !c.is_dir
            && !is_lock_file(&c.name)
            && !config.is_ignored(&c.name)
            && config.is_convertible(&naming::extension(&c.name))
    });

    for child in sources {
        let source = folder.join(&child.name);
        let dest = folder.join(naming::derived_name(
            &child.name,
            &config.derived_extension,
        ));

        let decision = match should_regenerate(
            &source,
            &dest,
            config.regeneration,
            config.regen_if_created_today,
        ) {
            Ok(d) => d,
            Err(e) => {
                warn!(file = %source.display(), "cannot read timestamps: {e}");
                stats.failed += 1;
                continue;
            }
        };

        if !decision.regenerate {
            debug!(file = %child.name, reason = %decision.reason, "conversion skipped");
            stats.up_to_date += 1;
            continue;
        }

        info!(file = %child.name, reason = %decision.reason, converter = converter.name(), "converting");
        match converter.convert(&source, &dest) {
            Ok(()) => stats.converted += 1,
            Err(e) => {
                warn!(file = %child.name, "conversion failed: {e}");
                stats.failed += 1;
            }
        }
    }

    stats
}

/// Convert one folder outside a build, then sweep the converter.
///
/// The converter is shut down even when the folder cannot be listed.
pub fn convert_standalone(
    folder: &Path,
    converter: &dyn Converter,
    config: &SiteConfig,
) -> std::io::Result<ConversionStats> {
    let stats = scan::list_children(folder)
        .map(|listing| convert_folder(folder, &listing, converter, config));
    converter.shutdown();
    let stats = stats?;
    info!(
        folder = %folder.display(),
        converted = stats.converted,
        up_to_date = stats.up_to_date,
        failed = stats.failed,
        "conversion complete"
    );
    Ok(stats)
}
