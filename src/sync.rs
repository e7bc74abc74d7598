//! Mirror a generated site into a collaborator's git repository.
//!
//! ```text
//! analyze source/extras → git ls-remote → clone (if needed)
//!     → tar backup → empty target (keep .git) → copy source, extras
//!     → git add . / commit / push
//! ```
//!
//! Configuration lives in its own TOML file (`sync.toml` by default), not in
//! the site `config.toml`: the sync runs on a machine that may never build
//! the site. Relative paths in it are resolved against the file's folder.
//!
//! Every external command goes through [`CommandRunner`]. In dry-run mode no
//! command runs and nothing on disk changes; each mutating step logs a
//! `[DRY-RUN]` line instead.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

pub const SYNC_CONFIG_FILENAME: &str = "sync.toml";
pub const CONFIG_VERSION: &str = "01";
const GIT_DIR: &str = ".git";
const NO_EXTENSION: &str = "(none)";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("sync configuration not found: {0}")]
    ConfigMissing(PathBuf),
    #[error("sync configuration version {found:?} is incompatible (expected {expected:?})")]
    IncompatibleVersion { found: String, expected: String },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("source folder does not exist: {0}")]
    SourceMissing(PathBuf),
    #[error("command `{command}` failed: {status}")]
    Command { command: String, status: String },
}

impl SyncError {
    /// Configuration problems are reported before anything is touched.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::ConfigMissing(_) | SyncError::IncompatibleVersion { .. } | SyncError::Toml(_)
        )
    }
}

// =========================================================================
// Configuration
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub meta: MetaSection,
    pub paths: PathsSection,
    pub remote: RemoteSection,
    #[serde(default)]
    pub backup: BackupSection,
    #[serde(default)]
    pub logging: SyncLogSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaSection {
    pub config_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsSection {
    /// Generated site to publish.
    pub source: PathBuf,
    /// Working copy of the collaborator's repository.
    pub target: PathBuf,
    /// Collaborator-specific files copied over the source.
    #[serde(default)]
    pub extras: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteSection {
    #[serde(default = "default_host")]
    pub host: String,
    pub owner: String,
    pub project: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_host() -> String {
    "github.com".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

impl RemoteSection {
    pub fn url(&self) -> String {
        format!("https://{}/{}/{}.git", self.host, self.owner, self.project)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupSection {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("backups"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncLogSection {
    pub level: String,
    pub file: PathBuf,
}

impl Default for SyncLogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::from("sync.log"),
        }
    }
}

impl SyncConfig {
    pub fn from_toml(text: &str) -> Result<Self, SyncError> {
        let config: SyncConfig = toml::from_str(text)?;
        if config.meta.config_version != CONFIG_VERSION {
            return Err(SyncError::IncompatibleVersion {
                found: config.meta.config_version,
                expected: CONFIG_VERSION.to_string(),
            });
        }
        Ok(config)
    }

    /// Resolve every relative path against `base`.
    fn anchored(mut self, base: &Path) -> Self {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.paths.source);
        anchor(&mut self.paths.target);
        if let Some(extras) = self.paths.extras.as_mut() {
            anchor(extras);
        }
        anchor(&mut self.backup.dir);
        anchor(&mut self.logging.file);
        self
    }
}

/// Load and check the sync configuration at `path`.
pub fn load_sync_config(path: &Path) -> Result<SyncConfig, SyncError> {
    if !path.is_file() {
        return Err(SyncError::ConfigMissing(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(SyncConfig::from_toml(&text)?.anchored(base))
}

// =========================================================================
// Commands
// =========================================================================

/// Runs external programs on behalf of the sync.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> Result<(), SyncError>;
}

/// Spawns real processes and waits for them.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> Result<(), SyncError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!(command = %command_line(program, args), "running");
        let status = cmd.status()?;
        if !status.success() {
            return Err(SyncError::Command {
                command: command_line(program, args),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

// =========================================================================
// Content analysis
// =========================================================================

/// Top-level folders and an extension histogram of a tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ContentSummary {
    pub folders: BTreeSet<String>,
    pub extensions: BTreeMap<String, usize>,
}

pub fn analyze(root: &Path) -> Result<ContentSummary, SyncError> {
    let mut summary = ContentSummary::default();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.file_name() != GIT_DIR);
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            if entry.depth() == 1 {
                summary
                    .folders
                    .insert(entry.file_name().to_string_lossy().into_owned());
            }
        } else {
            let ext = entry
                .path()
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| NO_EXTENSION.to_string());
            *summary.extensions.entry(ext).or_default() += 1;
        }
    }
    Ok(summary)
}

// =========================================================================
// File operations
// =========================================================================

/// Archive `target` (without `.git`) into a timestamped tar in `backup_dir`.
pub fn create_backup(target: &Path, backup_dir: &Path) -> Result<PathBuf, SyncError> {
    fs::create_dir_all(backup_dir)?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let archive = backup_dir.join(format!("backup_{stamp}.tar"));

    let mut builder = tar::Builder::new(fs::File::create(&archive)?);
    let walker = WalkDir::new(target)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != GIT_DIR);
    for entry in walker {
        let entry = entry?;
        let rel = entry.path().strip_prefix(target).unwrap_or(entry.path());
        if entry.file_type().is_dir() {
            builder.append_dir(rel, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), rel)?;
        }
    }
    builder.finish()?;
    Ok(archive)
}

/// Delete everything in `target` except `.git`. Returns the number of
/// top-level items removed.
pub fn clean_target(target: &Path) -> Result<usize, SyncError> {
    let mut removed = 0;
    for item in fs::read_dir(target)? {
        let item = item?;
        if item.file_name() == GIT_DIR {
            continue;
        }
        if item.file_type()?.is_dir() {
            fs::remove_dir_all(item.path())?;
        } else {
            fs::remove_file(item.path())?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// Copy the contents of `src` into `dst`, skipping `.git`, overwriting
/// existing files. Returns the number of files copied.
pub fn copy_content(src: &Path, dst: &Path) -> Result<usize, SyncError> {
    let mut copied = 0;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.file_name() != GIT_DIR);
    for entry in walker {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let dest = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
            copied += 1;
        }
    }
    Ok(copied)
}

// =========================================================================
// Orchestration
// =========================================================================

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub dry_run: bool,
    pub source: ContentSummary,
    pub extras: Option<ContentSummary>,
    pub cloned: bool,
    pub backup: Option<PathBuf>,
    pub removed: usize,
    pub copied: usize,
    /// Git commands run, or that would have run in a dry run.
    pub commands: Vec<String>,
}

struct Step<'a> {
    runner: &'a dyn CommandRunner,
    dry_run: bool,
    commands: Vec<String>,
}

impl Step<'_> {
    fn git(&mut self, args: &[&str], cwd: Option<&Path>) -> Result<(), SyncError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let line = command_line("git", &args);
        self.commands.push(line.clone());
        if self.dry_run {
            info!("[DRY-RUN] {line}");
            return Ok(());
        }
        self.runner.run("git", &args, cwd)
    }
}

/// Run the whole synchronization.
pub fn run_sync(
    config: &SyncConfig,
    runner: &dyn CommandRunner,
    dry_run: bool,
) -> Result<SyncReport, SyncError> {
    let paths = &config.paths;
    let mut report = SyncReport {
        dry_run,
        ..SyncReport::default()
    };
    info!("{}", if dry_run { "Mode: DRY-RUN" } else { "Mode: EXECUTE" });

    if !paths.source.is_dir() {
        return Err(SyncError::SourceMissing(paths.source.clone()));
    }
    report.source = analyze(&paths.source)?;
    info!(folders = ?report.source.folders, "source folders");
    info!(types = ?report.source.extensions, "source file types");

    let extras = paths.extras.as_deref().filter(|p| p.is_dir());
    if let Some(extras) = extras {
        let summary = analyze(extras)?;
        info!(folders = ?summary.folders, "extras folders");
        info!(types = ?summary.extensions, "extras file types");
        report.extras = Some(summary);
    }

    let url = config.remote.url();
    let target = paths.target.as_path();
    let target_str = target.to_string_lossy();
    let mut step = Step {
        runner,
        dry_run,
        commands: Vec::new(),
    };

    step.git(&["ls-remote", url.as_str()], None)?;

    if !target.join(GIT_DIR).exists() {
        step.git(
            &[
                "clone",
                "-b",
                config.remote.branch.as_str(),
                url.as_str(),
                target_str.as_ref(),
            ],
            None,
        )?;
        report.cloned = true;
    }

    if config.backup.enabled {
        if dry_run {
            info!("[DRY-RUN] backup of {} into {}", target.display(), config.backup.dir.display());
        } else if target.is_dir() {
            let archive = create_backup(target, &config.backup.dir)?;
            info!(archive = %archive.display(), "backup written");
            report.backup = Some(archive);
        }
    }

    if dry_run {
        info!("[DRY-RUN] empty {} (keeping .git)", target.display());
        info!("[DRY-RUN] copy {} into {}", paths.source.display(), target.display());
        if let Some(extras) = extras {
            info!("[DRY-RUN] copy {} into {}", extras.display(), target.display());
        }
    } else {
        fs::create_dir_all(target)?;
        report.removed = clean_target(target)?;
        info!(removed = report.removed, "target emptied");
        report.copied = copy_content(&paths.source, target)?;
        if let Some(extras) = extras {
            report.copied += copy_content(extras, target)?;
        }
        info!(files = report.copied, "content copied");
    }

    let message = format!("Automatic synchronization v{}", env!("CARGO_PKG_VERSION"));
    step.git(&["add", "."], Some(target))?;
    step.git(&["commit", "-m", message.as_str()], Some(target))?;
    step.git(&["push"], Some(target))?;

    report.commands = step.commands;
    info!("synchronization finished");
    Ok(report)
}

/// Commented stock sync configuration.
pub fn stock_sync_config_toml() -> &'static str {
    r##"# docsite sync configuration

[meta]
# Must match the version this docsite understands.
config_version = "01"

[paths]
# Generated site to publish.
source = "../site"
# Local working copy of the collaborator's repository (cloned if missing).
target = "../collaborator"
# Optional collaborator-specific files copied on top of the site.
# extras = "../collaborator-extras"

[remote]
host = "github.com"
owner = "someone"
project = "their-site"
branch = "main"

[backup]
# Archive the working copy (without .git) before emptying it.
enabled = false
dir = "backups"

[logging]
level = "info"
file = "sync.log"
"##
}

// =========================================================================
// Test doubles
// =========================================================================


#[cfg(test)]
mod tests {
    use super::mock::RecordingRunner;
    use super::*;
    use crate::test_helpers::*;
    use tempfile::TempDir;

    fn config_for(root: &Path, backup: bool) -> SyncConfig {
        let text = format!(
            r#"
[meta]
config_version = "01"

[paths]
source = "site"
target = "friend"
extras = "extras"

[remote]
owner = "alice"
project = "docs"

[backup]
enabled = {backup}
"#
        );
        SyncConfig::from_toml(&text).unwrap().anchored(root)
    }

    /// Source site, extras and an already-cloned target with stale content.
    fn setup_sync() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "site/index.html", "<html>");
        write(root, "site/cours/index.html", "<html>");
        write(root, "site/cours/a.pdf", "pdf");
        write(root, "extras/CNAME", "docs.example.org");
        write(root, "friend/.git/HEAD", "ref: refs/heads/main");
        write(root, "friend/old.html", "stale");
        write(root, "friend/old/page.html", "stale");
        tmp
    }

    #[test]
    fn parses_and_anchors_paths() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(tmp.path(), false);
        assert_eq!(config.paths.source, tmp.path().join("site"));
        assert_eq!(config.backup.dir, tmp.path().join("backups"));
        assert_eq!(config.remote.branch, "main");
        assert_eq!(config.remote.url(), "https://github.com/alice/docs.git");
    }

    #[test]
    fn stock_config_parses() {
        let config = SyncConfig::from_toml(stock_sync_config_toml()).unwrap();
        assert_eq!(config.meta.config_version, CONFIG_VERSION);
        assert!(config.paths.extras.is_none());
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let text = stock_sync_config_toml().replace(r#"config_version = "01""#, r#"config_version = "02""#);
        let err = SyncConfig::from_toml(&text).unwrap_err();
        assert!(matches!(err, SyncError::IncompatibleVersion { .. }));
        assert!(err.is_config_error());
    }

    #[test]
    fn missing_config_is_a_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_sync_config(&tmp.path().join(SYNC_CONFIG_FILENAME)).unwrap_err();
        assert!(matches!(err, SyncError::ConfigMissing(_)));
        assert!(err.is_config_error());
    }

    #[test]
    fn analyze_counts_extensions_and_top_folders() {
        let tmp = setup_sync();
        let summary = analyze(&tmp.path().join("site")).unwrap();
        assert_eq!(summary.folders, BTreeSet::from(["cours".to_string()]));
        assert_eq!(summary.extensions.get(".html"), Some(&2));
        assert_eq!(summary.extensions.get(".pdf"), Some(&1));

        let extras = analyze(&tmp.path().join("extras")).unwrap();
        assert_eq!(extras.extensions.get(NO_EXTENSION), Some(&1));
    }

    #[test]
    fn sync_replaces_target_content_and_keeps_git() {
        let tmp = setup_sync();
        let root = tmp.path();
        let runner = RecordingRunner::new();

        let report = run_sync(&config_for(root, false), &runner, false).unwrap();

        let friend = root.join("friend");
        assert!(friend.join(".git/HEAD").exists());
        assert!(!friend.join("old.html").exists());
        assert!(!friend.join("old").exists());
        assert!(friend.join("cours/a.pdf").exists());
        assert!(friend.join("CNAME").exists());
        assert_eq!(report.removed, 2);
        assert_eq!(report.copied, 4);
        assert!(!report.cloned);

        let lines = runner.lines();
        assert_eq!(lines[0], "git ls-remote https://github.com/alice/docs.git");
        assert_eq!(lines[1], "git add .");
        assert!(lines[2].starts_with("git commit -m Automatic synchronization v"));
        assert_eq!(lines[3], "git push");
        assert_eq!(runner.cwds()[3].as_deref(), Some(friend.as_path()));
    }

    #[test]
    fn missing_working_copy_is_cloned() {
        let tmp = setup_sync();
        let root = tmp.path();
        fs::remove_dir_all(root.join("friend")).unwrap();
        let runner = RecordingRunner::new();

        let report = run_sync(&config_for(root, false), &runner, false).unwrap();

        assert!(report.cloned);
        assert!(runner.lines()[1].starts_with("git clone -b main https://github.com/alice/docs.git"));
    }

    #[test]
    fn dry_run_changes_nothing() {
        let tmp = setup_sync();
        let root = tmp.path();
        let runner = RecordingRunner::new();

        let report = run_sync(&config_for(root, true), &runner, true).unwrap();

        assert!(runner.lines().is_empty());
        assert_eq!(report.commands.len(), 4);
        assert!(root.join("friend/old.html").exists());
        assert!(!root.join("friend/cours").exists());
        assert!(!root.join("backups").exists());
    }

    #[test]
    fn backup_excludes_git() {
        let tmp = setup_sync();
        let root = tmp.path();
        let runner = RecordingRunner::new();

        let report = run_sync(&config_for(root, true), &runner, false).unwrap();

        let archive = report.backup.unwrap();
        let mut names: Vec<String> = tar::Archive::new(fs::File::open(&archive).unwrap())
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert!(names.iter().any(|n| n == "old.html"));
        assert!(names.iter().all(|n| !n.contains(".git")));
    }

    #[test]
    fn failing_command_stops_the_sync() {
        let tmp = setup_sync();
        let root = tmp.path();
        let runner = RecordingRunner::failing_on("ls-remote");

        let err = run_sync(&config_for(root, false), &runner, false).unwrap_err();

        assert!(matches!(err, SyncError::Command { .. }));
        assert!(root.join("friend/old.html").exists());
    }

    #[test]
    fn missing_source_is_reported_before_git() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let err = run_sync(&config_for(tmp.path(), false), &runner, false).unwrap_err();
        assert!(matches!(err, SyncError::SourceMissing(_)));
        assert!(runner.lines().is_empty());
    }
}
