//! CLI output formatting for every command.
//!
//! Each command has a `format_*` function returning `Vec<String>` and a
//! `print_*` wrapper that writes the lines to stdout. Format functions are
//! pure, so the exact wording is covered by unit tests. Progress and
//! diagnostics go through `tracing` instead; this module only prints the
//! final summaries.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Scan
//!     3 folders, 2 new entries, 1 manifest saved
//!     1 derived document skipped
//! Convert
//!     1 converted, 4 up to date, 0 failed
//! Render
//!     4 pages
//! Copy
//!     7 files
//! Built site in site/
//! ```
//!
//! ## Check
//!
//! ```text
//! Cours/
//!     manifest missing
//!     + 003 Leçon 2.docx → lecon_2.pdf
//!     = lecon_1.pdf (derived, skipped)
//!
//! 3 folders checked, 1 to update
//! ```
//!
//! ## Convert
//!
//! ```text
//! Cours/
//!     1 converted, 4 up to date, 0 failed
//! ```

use crate::convert::ConversionStats;
use crate::pipeline::{BuildReport, FolderCheck};
use crate::repair::RepairSummary;
use crate::sync::SyncReport;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a manifest position as 3-digit zero-padded.
fn format_position(pos: i64) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 folder` / `2 folders`.
fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn entries(n: usize) -> String {
    if n == 1 {
        "1 new entry".to_string()
    } else {
        format!("{n} new entries")
    }
}

fn conversion_counts(stats: &ConversionStats) -> String {
    format!(
        "{} converted, {} up to date, {} failed",
        stats.converted, stats.up_to_date, stats.failed
    )
}

/// A source-relative folder as shown to the user; the root is `./`.
fn folder_label(rel: &Path) -> String {
    if rel.as_os_str().is_empty() {
        "./".to_string()
    } else {
        format!("{}/", rel.display())
    }
}

// ============================================================================
// Build
// ============================================================================

pub fn format_build_summary(report: &BuildReport, output_root: &Path) -> Vec<String> {
    let mut lines = vec![
        "Scan".to_string(),
        format!(
            "{}{}, {}, {} saved",
            indent(1),
            plural(report.folders, "folder"),
            entries(report.entries_added),
            plural(report.manifests_saved, "manifest"),
        ),
    ];
    if report.derived_skipped > 0 {
        lines.push(format!(
            "{}{} skipped",
            indent(1),
            plural(report.derived_skipped, "derived document")
        ));
    }

    lines.push("Convert".to_string());
    if report.conversion_enabled {
        lines.push(format!("{}{}", indent(1), conversion_counts(&report.conversions)));
    } else {
        lines.push(format!("{}no converter available, skipped", indent(1)));
    }

    lines.push("Render".to_string());
    lines.push(format!("{}{}", indent(1), plural(report.pages, "page")));
    lines.push("Copy".to_string());
    lines.push(format!("{}{}", indent(1), plural(report.files_copied, "file")));
    lines.push(format!("Built site in {}", folder_label(output_root)));
    lines
}

pub fn print_build_summary(report: &BuildReport, output_root: &Path) {
    for line in format_build_summary(report, output_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Only folders that would change are listed, followed by a count line.
pub fn format_check_output(checks: &[FolderCheck]) -> Vec<String> {
    let mut lines = Vec::new();
    let pending: Vec<&FolderCheck> = checks.iter().filter(|c| c.needs_update()).collect();

    for check in &pending {
        lines.push(folder_label(&check.folder));
        if check.missing_manifest {
            lines.push(format!("{}manifest missing", indent(1)));
        } else if check.defaults_missing {
            lines.push(format!("{}folder settings incomplete", indent(1)));
        }
        for added in &check.added {
            lines.push(format!(
                "{}+ {} {} → {}",
                indent(1),
                format_position(added.position),
                added.source_name,
                added.output_name
            ));
        }
        for name in &check.derived_skipped {
            lines.push(format!("{}= {} (derived, skipped)", indent(1), name));
        }
        lines.push(String::new());
    }

    lines.push(format!(
        "{} checked, {} to update",
        plural(checks.len(), "folder"),
        pending.len()
    ));
    lines
}

pub fn print_check_output(checks: &[FolderCheck]) {
    for line in format_check_output(checks) {
        println!("{}", line);
    }
}

// ============================================================================
// Convert
// ============================================================================

pub fn format_convert_summary(stats: &ConversionStats, folder: &Path) -> Vec<String> {
    vec![
        folder_label(folder),
        format!("{}{}", indent(1), conversion_counts(stats)),
    ]
}

pub fn print_convert_summary(stats: &ConversionStats, folder: &Path) {
    for line in format_convert_summary(stats, folder) {
        println!("{}", line);
    }
}

// ============================================================================
// Repair
// ============================================================================

pub fn format_repair_output(summary: &RepairSummary, dry_run: bool) -> Vec<String> {
    let mut lines = Vec::new();

    for folder in &summary.folders {
        lines.push(folder_label(&folder.folder));
        for name in &folder.duplicates_removed {
            lines.push(format!("{}- {} (derived duplicate)", indent(1), name));
        }
        for name in &folder.idem_replaced {
            lines.push(format!("{}~ {} (idem → {{{{source_stem}}}})", indent(1), name));
        }
    }

    for (folder, error) in &summary.corrupt {
        lines.push(format!("{} unreadable, left untouched", folder_label(folder)));
        lines.push(format!("{}{}", indent(1), error));
    }

    let changes = summary.duplicates_removed() + summary.idem_replaced();
    lines.push(format!(
        "{}{} scanned: {} removed, {} relabelled",
        if dry_run { "[DRY-RUN] " } else { "" },
        plural(summary.scanned, "manifest"),
        summary.duplicates_removed(),
        summary.idem_replaced(),
    ));
    if dry_run && changes > 0 {
        lines.push(format!("{} not saved", plural(changes, "change")));
    }
    lines
}

pub fn print_repair_output(summary: &RepairSummary, dry_run: bool) {
    for line in format_repair_output(summary, dry_run) {
        println!("{}", line);
    }
}

// ============================================================================
// Sync
// ============================================================================

pub fn format_sync_output(report: &SyncReport) -> Vec<String> {
    let mut lines = vec!["Source".to_string()];
    let folders: Vec<&str> = report.source.folders.iter().map(String::as_str).collect();
    lines.push(format!("{}folders: {}", indent(1), folders.join(", ")));
    for (ext, count) in &report.source.extensions {
        lines.push(format!("{}{}: {}", indent(1), ext, count));
    }
    if let Some(extras) = &report.extras {
        lines.push("Extras".to_string());
        for (ext, count) in &extras.extensions {
            lines.push(format!("{}{}: {}", indent(1), ext, count));
        }
    }

    lines.push("Git".to_string());
    for command in &report.commands {
        lines.push(format!("{}{}", indent(1), command));
    }

    if let Some(archive) = &report.backup {
        lines.push(format!("Backup: {}", archive.display()));
    }
    if report.dry_run {
        lines.push("[DRY-RUN] nothing was changed".to_string());
    } else {
        lines.push(format!(
            "Synchronized: {} removed, {} copied",
            report.removed,
            plural(report.copied, "file")
        ));
    }
    lines
}

pub fn print_sync_output(report: &SyncReport) {
    for line in format_sync_output(report) {
        println!("{}", line);
    }
}
