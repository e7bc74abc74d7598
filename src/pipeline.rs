//! Build orchestration.
//!
//! Runs the whole build as strictly sequential, complete traversals of the
//! source tree:
//!
//! ```text
//! 0. Reset    output/ wiped and recreated, style.css written
//! 1. Scan     per folder: convert → load manifest → defaults → reconcile → save if changed
//! 2. Render   per folder: index.html, then the table of contents
//! 3. Copy     every publishable file to its normalized output path
//! 4. Sweep    converter shutdown (lingering processes)
//! ```
//!
//! Phase 2 only starts once every manifest of phase 1 is saved, so every page
//! (and the breadcrumb labels it reads from parent manifests) sees the
//! reconciled tree.
//!
//! The table-of-contents folder at the source root only holds settings and
//! fragments for the TOC page; it is skipped by every phase.

use crate::config::SiteConfig;
use crate::convert::{self, ConversionStats, Converter};
use crate::generate::{self, GenerateError, RenderContext};
use crate::manifest::{Manifest, ManifestError};
use crate::naming;
use crate::scan::{self, AddedEntry, ScanRules};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Render error: {0}")]
    Generate(#[from] GenerateError),
    #[error("Source folder not found: {0}")]
    SourceMissing(PathBuf),
    #[error("Output folder {output} overlaps source folder {source_root}")]
    OutputOverlapsSource {
        output: PathBuf,
        source_root: PathBuf,
    },
}

/// Inputs of a build run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub config: SiteConfig,
}

impl BuildContext {
    pub fn new(source_root: PathBuf, output_root: PathBuf, config: SiteConfig) -> Self {
        Self {
            source_root,
            output_root,
            config,
        }
    }

    fn render_context(&self) -> RenderContext<'_> {
        RenderContext::new(&self.config, &self.source_root)
    }

    /// Source folders in walk order (parents before children, names sorted),
    /// with ignore-names pruned and the TOC settings folder left out.
    pub fn source_folders(&self) -> Result<Vec<PathBuf>, BuildError> {
        let mut folders = Vec::new();
        for entry in self.walk() {
            let entry = entry?;
            if entry.file_type().is_dir() {
                folders.push(entry.into_path());
            }
        }
        Ok(folders)
    }

    fn walk(&self) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> + '_ {
        WalkDir::new(&self.source_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                if self.config.is_ignored(&name) {
                    return false;
                }
                !(e.depth() == 1 && e.file_type().is_dir() && name == self.config.toc_dir)
            })
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.source_root).unwrap_or(path)
    }

    fn is_root(&self, folder: &Path) -> bool {
        self.relative(folder).as_os_str().is_empty()
    }

    /// Refuse to wipe an output folder that contains, or sits inside, the sources.
    fn check_roots(&self) -> Result<(), BuildError> {
        if !self.source_root.is_dir() {
            return Err(BuildError::SourceMissing(self.source_root.clone()));
        }
        let source = std::path::absolute(&self.source_root)?;
        let output = std::path::absolute(&self.output_root)?;
        if output.starts_with(&source) || source.starts_with(&output) {
            return Err(BuildError::OutputOverlapsSource {
                output,
                source_root: source,
            });
        }
        Ok(())
    }
}

/// Per-phase counters of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub folders: usize,
    pub entries_added: usize,
    pub manifests_saved: usize,
    pub derived_skipped: usize,
    pub conversions: ConversionStats,
    pub conversion_enabled: bool,
    pub pages: usize,
    pub files_copied: usize,
}

/// Run the full build.
///
/// `converter` is `None` when no converter is available; conversion is then
/// skipped and existing derived documents are published as they are.
pub fn build_site(
    ctx: &BuildContext,
    converter: Option<&dyn Converter>,
) -> Result<BuildReport, BuildError> {
    ctx.check_roots()?;
    let mut report = BuildReport {
        conversion_enabled: converter.is_some(),
        ..BuildReport::default()
    };

    let phases = run_phases(ctx, converter, &mut report);
    // Sweep lingering converter processes whether or not a phase failed.
    if let Some(converter) = converter {
        converter.shutdown();
    }
    phases?;

    info!(
        folders = report.folders,
        added = report.entries_added,
        pages = report.pages,
        copied = report.files_copied,
        "build complete"
    );
    Ok(report)
}

fn run_phases(
    ctx: &BuildContext,
    converter: Option<&dyn Converter>,
    report: &mut BuildReport,
) -> Result<(), BuildError> {
    reset_output(ctx)?;

    info!(source = %ctx.source_root.display(), "phase 1: scan");
    let folders = ctx.source_folders()?;
    for folder in &folders {
        scan_folder(ctx, folder, converter, report)?;
    }
    report.folders = folders.len();

    info!(output = %ctx.output_root.display(), "phase 2: render");
    report.pages = render_pages(ctx)?;

    info!("phase 3: copy");
    report.files_copied = copy_assets(ctx)?;
    Ok(())
}

fn reset_output(ctx: &BuildContext) -> Result<(), BuildError> {
    if ctx.output_root.exists() {
        debug!(output = %ctx.output_root.display(), "removing previous output");
        fs::remove_dir_all(&ctx.output_root)?;
    }
    fs::create_dir_all(&ctx.output_root)?;
    fs::write(ctx.output_root.join("style.css"), generate::stylesheet())?;
    Ok(())
}

/// Folder name used for the title default (empty at the root).
fn folder_name(ctx: &BuildContext, folder: &Path) -> String {
    ctx.relative(folder)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn scan_folder(
    ctx: &BuildContext,
    folder: &Path,
    converter: Option<&dyn Converter>,
    report: &mut BuildReport,
) -> Result<(), BuildError> {
    let config = &ctx.config;
    let is_root = ctx.is_root(folder);
    let mut listing = scan::list_children(folder)?;

    if let Some(converter) = converter {
        let stats = convert::convert_folder(folder, &listing, converter, config);
        if stats.converted > 0 {
            listing = scan::list_children(folder)?;
        }
        report.conversions.add(stats);
    }

    let mut manifest = Manifest::load(folder);
    let defaults_added =
        manifest.apply_defaults(&folder_name(ctx, folder), is_root, &config.site_title);
    let scan_report = scan::reconcile(&listing, &mut manifest, &ScanRules::new(config, is_root));

    report.entries_added += scan_report.added.len();
    report.derived_skipped += scan_report.derived_skipped.len();

    if defaults_added || scan_report.changed() {
        manifest.save(folder)?;
        report.manifests_saved += 1;
        debug!(folder = %folder.display(), "manifest saved");
    }
    Ok(())
}

fn write_page(dir: &Path, html: &str) -> Result<(), BuildError> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("index.html"), html)?;
    Ok(())
}

/// Phase 2: every folder page, then the table of contents.
fn render_pages(ctx: &BuildContext) -> Result<usize, BuildError> {
    let rctx = ctx.render_context();
    let mut pages = 0;
    for folder in ctx.source_folders()? {
        let html = generate::render_index_page(&rctx, &folder)?;
        let out_dir = generate::output_dir_for(&ctx.output_root, ctx.relative(&folder));
        write_page(&out_dir, &html)?;
        pages += 1;
    }
    write_toc(ctx)?;
    Ok(pages + 1)
}

/// Render only the table of contents into the output tree.
///
/// Returns the path of the written page.
pub fn write_toc(ctx: &BuildContext) -> Result<PathBuf, BuildError> {
    if !ctx.source_root.is_dir() {
        return Err(BuildError::SourceMissing(ctx.source_root.clone()));
    }
    let html = generate::render_toc_page(&ctx.render_context())?;
    let dir = ctx.output_root.join(&ctx.config.toc_dir);
    write_page(&dir, &html)?;
    Ok(dir.join("index.html"))
}

/// Whether a source file is published by the copy phase.
pub fn is_publishable(config: &SiteConfig, name: &str) -> bool {
    let ext = naming::extension(name);
    config.is_copyable(&ext)
        && !config.is_convertible(&ext)
        && !scan::is_reserved_file(name)
        && !scan::is_lock_file(name)
}

/// Phase 3: copy publishable files to their normalized output paths.
fn copy_assets(ctx: &BuildContext) -> Result<usize, BuildError> {
    let mut copied = 0;
    for entry in ctx.walk() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !is_publishable(&ctx.config, &name) {
            continue;
        }
        let dest = ctx
            .output_root
            .join(naming::normalize_path(ctx.relative(entry.path())));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &dest)?;
        copied += 1;
    }
    Ok(copied)
}

/// What phase 1 would do to one folder, computed without touching disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderCheck {
    pub folder: PathBuf,
    pub missing_manifest: bool,
    pub defaults_missing: bool,
    pub added: Vec<AddedEntry>,
    pub derived_skipped: Vec<String>,
}

impl FolderCheck {
    pub fn needs_update(&self) -> bool {
        self.defaults_missing || !self.added.is_empty()
    }
}

/// Reconcile every folder in memory and report the differences.
///
/// Nothing is converted or saved.
pub fn check_site(ctx: &BuildContext) -> Result<Vec<FolderCheck>, BuildError> {
    if !ctx.source_root.is_dir() {
        return Err(BuildError::SourceMissing(ctx.source_root.clone()));
    }
    let mut checks = Vec::new();
    for folder in ctx.source_folders()? {
        let is_root = ctx.is_root(&folder);
        let listing = scan::list_children(&folder)?;
        let missing_manifest = Manifest::try_load(&folder).ok().flatten().is_none();
        let mut manifest = Manifest::load(&folder);
        let defaults_missing =
            manifest.apply_defaults(&folder_name(ctx, &folder), is_root, &ctx.config.site_title);
        let report = scan::reconcile(
            &listing,
            &mut manifest,
            &ScanRules::new(&ctx.config, is_root),
        );
        checks.push(FolderCheck {
            folder: ctx.relative(&folder).to_path_buf(),
            missing_manifest,
            defaults_missing,
            added: report.added,
            derived_skipped: report.derived_skipped,
        });
    }
    Ok(checks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::backend::tests::{MockConverter, RecordedOp};
    use crate::test_helpers::*;
    use crate::types::Partition;
    use tempfile::TempDir;

    fn context(tmp: &TempDir) -> BuildContext {
        let source = tmp.path().join("src");
        fs::create_dir_all(&source).unwrap();
        BuildContext::new(source, tmp.path().join("site"), SiteConfig::default())
    }

    #[test]
    fn builds_pages_manifests_and_assets() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        touch(&ctx.source_root, "Cours Été/notes.pdf");
        touch(&ctx.source_root, "intro.html");

        let report = build_site(&ctx, None).unwrap();

        assert_eq!(report.folders, 2);
        assert_eq!(report.entries_added, 3);
        assert_eq!(report.pages, 3);
        assert_eq!(report.files_copied, 2);
        assert!(ctx.output_root.join("index.html").exists());
        assert!(ctx.output_root.join("style.css").exists());
        assert!(ctx.output_root.join("cours_ete/index.html").exists());
        assert!(ctx.output_root.join("cours_ete/notes.pdf").exists());
        assert!(ctx.output_root.join("TDM/index.html").exists());
        assert!(ctx.source_root.join("STRUCTURE.toml").exists());
    }

    #[test]
    fn converter_runs_before_reconcile() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        touch(&ctx.source_root, "Leçon 1.docx");
        let mock = MockConverter::new();

        let report = build_site(&ctx, Some(&mock)).unwrap();

        assert_eq!(report.conversions.converted, 1);
        assert_eq!(report.derived_skipped, 1);
        let m = Manifest::load(&ctx.source_root);
        assert_eq!(source_names(&m, Partition::Files), vec!["Leçon 1.docx"]);
        assert!(ctx.output_root.join("lecon_1.pdf").exists());
        assert!(!ctx.output_root.join("leçon_1.docx").exists());
        assert_eq!(mock.get_operations().last(), Some(&RecordedOp::Shutdown));
    }

    #[test]
    fn converter_is_shut_down_when_a_phase_fails() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        touch(&ctx.source_root, "Leçon.docx");
        // A directory in place of the manifest makes the scan's save fail.
        mkdir(&ctx.source_root, "STRUCTURE.toml");
        let mock = MockConverter::new();

        let result = build_site(&ctx, Some(&mock));

        assert!(result.is_err());
        let ops = mock.get_operations();
        assert_eq!(mock.converted_sources(), vec!["Leçon.docx"]);
        assert!(ops.contains(&RecordedOp::Shutdown));
    }

    #[test]
    fn second_build_saves_nothing() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        touch(&ctx.source_root, "a.pdf");

        build_site(&ctx, None).unwrap();
        let report = build_site(&ctx, None).unwrap();
        assert_eq!(report.manifests_saved, 0);
        assert_eq!(report.entries_added, 0);
    }

    #[test]
    fn toc_folder_and_ignored_names_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        write(&ctx.source_root, "TDM/entete.html", "<h1>x</h1>");
        touch(&ctx.source_root, "nppBackup/old.pdf");

        let report = build_site(&ctx, None).unwrap();
        assert_eq!(report.folders, 1);
        assert!(!ctx.source_root.join("TDM/STRUCTURE.toml").exists());
        assert!(!ctx.output_root.join("nppbackup").exists());
    }

    #[test]
    fn fragments_and_manifests_are_not_published() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        write(&ctx.source_root, "entete.html", "<p>h</p>");
        write(&ctx.source_root, "page.html", "<p>p</p>");

        build_site(&ctx, None).unwrap();
        assert!(!ctx.output_root.join("entete.html").exists());
        assert!(!ctx.output_root.join("STRUCTURE.toml").exists());
        assert!(ctx.output_root.join("page.html").exists());
    }

    #[test]
    fn output_inside_source_is_refused() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().to_path_buf();
        let ctx = BuildContext::new(source.clone(), source.join("site"), SiteConfig::default());
        assert!(matches!(
            build_site(&ctx, None),
            Err(BuildError::OutputOverlapsSource { .. })
        ));
    }

    #[test]
    fn missing_source_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let ctx = BuildContext::new(
            tmp.path().join("nope"),
            tmp.path().join("site"),
            SiteConfig::default(),
        );
        assert!(matches!(
            build_site(&ctx, None),
            Err(BuildError::SourceMissing(_))
        ));
    }

    #[test]
    fn check_reports_without_saving() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        touch(&ctx.source_root, "a.pdf");

        let checks = check_site(&ctx).unwrap();
        assert_eq!(checks.len(), 1);
        assert!(checks[0].missing_manifest);
        assert!(checks[0].needs_update());
        assert_eq!(checks[0].added[0].source_name, "a.pdf");
        assert!(!ctx.source_root.join("STRUCTURE.toml").exists());
    }

    #[test]
    fn write_toc_only_touches_toc_page() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let path = write_toc(&ctx).unwrap();
        assert_eq!(path, ctx.output_root.join("TDM/index.html"));
        assert!(path.exists());
        assert!(!ctx.output_root.join("index.html").exists());
    }

    #[test]
    fn publishable_rules() {
        let config = SiteConfig::default();
        assert!(is_publishable(&config, "a.pdf"));
        assert!(is_publishable(&config, "photo.JPG"));
        assert!(!is_publishable(&config, "a.docx"));
        assert!(!is_publishable(&config, "pied_general.html"));
        assert!(!is_publishable(&config, "config.toml"));
        assert!(!is_publishable(&config, "notes.txt"));
    }
}
