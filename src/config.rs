//! Site configuration module.
//!
//! Handles loading, validating, and printing `config.toml`. The file lives at
//! the root of the source tree and is read once at startup; the resulting
//! [`SiteConfig`] is passed by reference to every stage.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! site_title = "Documentation"   # Title of the root index page
//! base_path = ""                 # URL prefix substituted for {{BASE_PATH}}
//! toc_dir = "TDM"                # Folder holding the table of contents
//! regeneration = false           # true | false | "DD/MM/YYYY"
//!
//! [decoration]
//! folder_prefix = "📁 "
//! file_prefix = "📘 "
//!
//! [templates]
//! max_passes = 5
//! strict = false
//! ```
//!
//! Run `docsite gen-config` for the full, commented list.
//!
//! ## Loading
//!
//! Stock defaults are serialized to a TOML value, the user file is merged on
//! top of it key by key, and the merged value is deserialized with unknown
//! keys rejected. A file that only sets `site_title` therefore keeps every
//! other default.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the configuration file at the source root.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Title of the root folder when its manifest does not set one.
    pub site_title: String,
    /// URL prefix of the published site, substituted for `{{BASE_PATH}}`.
    pub base_path: String,
    /// Folder (at the source and output roots) holding the table of contents.
    pub toc_dir: String,
    /// Wrap fragments and navigation in HTML marker comments.
    pub show_structure: bool,
    /// Keep the default link underline in index tables.
    pub underline_index_links: bool,
    /// Extensions that get a manifest entry.
    pub accepted_extensions: Vec<String>,
    /// Extensions copied to the output tree.
    pub copyable_extensions: Vec<String>,
    /// Extensions converted offline into `derived_extension`.
    pub convertible_extensions: Vec<String>,
    /// Extension of the converted artifact.
    pub derived_extension: String,
    /// Script/control files that never get an entry.
    pub script_extensions: Vec<String>,
    /// File and folder names skipped everywhere.
    pub ignore: Vec<String>,
    /// When to rebuild derived documents that already exist.
    pub regeneration: RegenerationPolicy,
    /// Rebuild derived documents whose modification date is today.
    pub regen_if_created_today: bool,
    /// Raw HTML inserted at the top of every page.
    pub page_top: Vec<String>,
    /// Raw HTML inserted at the bottom of every page.
    pub page_bottom: Vec<String>,
    pub decoration: DecorationConfig,
    pub labels: LabelsConfig,
    pub templates: TemplateConfig,
    pub converter: ConverterConfig,
    pub log: LogConfig,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_title: "Documentation".to_string(),
            base_path: String::new(),
            toc_dir: "TDM".to_string(),
            show_structure: false,
            underline_index_links: false,
            accepted_extensions: strings(&[
                "pdf", "doc", "docx", "html", "htm", "txt", "jpg", "jpeg", "png", "gif",
            ]),
            copyable_extensions: strings(&[
                "pdf", "html", "htm", "jpg", "jpeg", "png", "gif", "css", "js",
            ]),
            convertible_extensions: strings(&["doc", "docx"]),
            derived_extension: "pdf".to_string(),
            script_extensions: strings(&["py", "cmd", "bat"]),
            ignore: strings(&["nppBackup", ".git", ".github", "__pycache__"]),
            regeneration: RegenerationPolicy::Normal,
            regen_if_created_today: false,
            page_top: Vec::new(),
            page_bottom: Vec::new(),
            decoration: DecorationConfig::default(),
            labels: LabelsConfig::default(),
            templates: TemplateConfig::default(),
            converter: ConverterConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.templates.max_passes == 0 {
            return Err(ConfigError::Validation(
                "templates.max_passes must be at least 1".into(),
            ));
        }
        if self.derived_extension.is_empty() {
            return Err(ConfigError::Validation(
                "derived_extension must not be empty".into(),
            ));
        }
        if self.is_convertible(&self.derived_extension) {
            return Err(ConfigError::Validation(
                "derived_extension must not also be convertible".into(),
            ));
        }
        if self.toc_dir.is_empty() {
            return Err(ConfigError::Validation("toc_dir must not be empty".into()));
        }
        if self.converter.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "converter.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn is_convertible(&self, ext: &str) -> bool {
        contains_ext(&self.convertible_extensions, ext)
    }

    pub fn is_accepted(&self, ext: &str) -> bool {
        contains_ext(&self.accepted_extensions, ext)
    }

    pub fn is_copyable(&self, ext: &str) -> bool {
        contains_ext(&self.copyable_extensions, ext)
    }

    pub fn is_script(&self, ext: &str) -> bool {
        contains_ext(&self.script_extensions, ext)
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|n| n == name)
    }
}

fn contains_ext(list: &[String], ext: &str) -> bool {
    list.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

/// When an existing derived document is rebuilt from its source.
///
/// Written in `config.toml` as `false` (normal), `true` (force all) or a
/// `"DD/MM/YYYY"` cutoff date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub enum RegenerationPolicy {
    /// Rebuild when the derived document is missing or older than its source.
    Normal,
    /// Rebuild everything.
    ForceAll,
    /// Also rebuild when the source was modified after this date.
    Since(NaiveDate),
}

/// Cutoff date format used by [`RegenerationPolicy::Since`].
pub const POLICY_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawPolicy {
    Flag(bool),
    Date(String),
}

impl TryFrom<RawPolicy> for RegenerationPolicy {
    type Error = String;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        match raw {
            RawPolicy::Flag(true) => Ok(Self::ForceAll),
            RawPolicy::Flag(false) => Ok(Self::Normal),
            RawPolicy::Date(s) => NaiveDate::parse_from_str(s.trim(), POLICY_DATE_FORMAT)
                .map(Self::Since)
                .map_err(|e| format!("regeneration date {s:?} is not DD/MM/YYYY: {e}")),
        }
    }
}

impl From<RegenerationPolicy> for RawPolicy {
    fn from(policy: RegenerationPolicy) -> Self {
        match policy {
            RegenerationPolicy::Normal => RawPolicy::Flag(false),
            RegenerationPolicy::ForceAll => RawPolicy::Flag(true),
            RegenerationPolicy::Since(d) => {
                RawPolicy::Date(d.format(POLICY_DATE_FORMAT).to_string())
            }
        }
    }
}

/// Prefix/suffix wrapped around index labels, per entry kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecorationConfig {
    pub folder_prefix: String,
    pub folder_suffix: String,
    pub file_prefix: String,
    pub file_suffix: String,
}

impl Default for DecorationConfig {
    fn default() -> Self {
        Self {
            folder_prefix: "📁 ".to_string(),
            folder_suffix: String::new(),
            file_prefix: "📘 ".to_string(),
            file_suffix: String::new(),
        }
    }
}

/// Fixed labels of the navigation bar and the table of contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelsConfig {
    pub home: String,
    pub toc: String,
    pub toc_title: String,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            home: "Accueil".to_string(),
            toc: "Sommaire".to_string(),
            toc_title: "Table des matières".to_string(),
        }
    }
}

/// Template resolution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateConfig {
    /// Maximum resolution passes over an entry's fields.
    pub max_passes: usize,
    /// Fail instead of leaving unknown `{{placeholders}}` in the output.
    pub strict: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            max_passes: 5,
            strict: false,
        }
    }
}

/// External document converter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    /// Office suite executable, looked up on `PATH`.
    pub program: String,
    /// Seconds before a conversion is abandoned and its process killed.
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: "soffice".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Run log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Log file, relative to the working directory. Truncated on each run.
    pub file: String,
    /// `tracing` filter directive (`info`, `debug`, `docsite=debug`, ...).
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: "generation.log".to_string(),
            level: "info".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist, `Err` if it is invalid TOML.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load the site config for a source root.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(root)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# docsite configuration
# =====================
# Place this file at the root of the source tree as config.toml.
# All settings are optional; values shown are the defaults.
# Unknown keys cause an error.

# Title of the root index page (other folders default to their own name).
site_title = "Documentation"

# URL prefix of the published site. Substituted for {{BASE_PATH}} in
# entete*.html / pied*.html fragments and used for absolute links.
base_path = ""

# Folder holding the table of contents, both in the source tree (for its
# STRUCTURE.toml and fragments) and in the output tree.
toc_dir = "TDM"

# Wrap fragments and navigation in <!-- marker --> comments.
show_structure = false

# Keep the link underline in index tables.
underline_index_links = false

# Extensions that get an entry in STRUCTURE.toml.
accepted_extensions = ["pdf", "doc", "docx", "html", "htm", "txt", "jpg", "jpeg", "png", "gif"]

# Extensions copied to the output tree.
copyable_extensions = ["pdf", "html", "htm", "jpg", "jpeg", "png", "gif", "css", "js"]

# Documents converted offline, and the extension they are converted to.
convertible_extensions = ["doc", "docx"]
derived_extension = "pdf"

# Script/control files that never get an entry.
script_extensions = ["py", "cmd", "bat"]

# Names skipped everywhere (files and folders).
ignore = ["nppBackup", ".git", ".github", "__pycache__"]

# Rebuild policy for existing PDFs:
#   false         -> only when the PDF is missing or older than its source
#   true          -> rebuild every PDF
#   "DD/MM/YYYY"  -> also rebuild when the source changed after that date
regeneration = false

# Rebuild PDFs whose modification date is today (a previous run today may
# have failed half-way).
regen_if_created_today = false

# Raw HTML inserted at the top / bottom of every index page.
page_top = []
page_bottom = []

# ---------------------------------------------------------------------------
# Label decoration in index tables
# ---------------------------------------------------------------------------
[decoration]
folder_prefix = "📁 "
folder_suffix = ""
file_prefix = "📘 "
file_suffix = ""

# ---------------------------------------------------------------------------
# Fixed labels
# ---------------------------------------------------------------------------
[labels]
home = "Accueil"
toc = "Sommaire"
toc_title = "Table des matières"

# ---------------------------------------------------------------------------
# {{variable}} resolution in STRUCTURE.toml display fields
# ---------------------------------------------------------------------------
[templates]
# Passes over an entry's fields; nested references need one pass per level.
max_passes = 5
# Fail the build when a placeholder cannot be resolved.
strict = false

# ---------------------------------------------------------------------------
# DOCX -> PDF conversion
# ---------------------------------------------------------------------------
[converter]
# Office suite executable, looked up on PATH. Conversion is disabled when
# it cannot be found.
program = "soffice"
timeout_secs = 120

# ---------------------------------------------------------------------------
# Run log
# ---------------------------------------------------------------------------
[log]
file = "generation.log"
level = "info"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_title_and_toc() {
        let config = SiteConfig::default();
        assert_eq!(config.site_title, "Documentation");
        assert_eq!(config.toc_dir, "TDM");
        assert_eq!(config.regeneration, RegenerationPolicy::Normal);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(SiteConfig::default().validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
site_title = "Hébreu biblique"

[decoration]
folder_prefix = "> "
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.site_title, "Hébreu biblique");
        assert_eq!(config.decoration.folder_prefix, "> ");
        // Defaults preserved
        assert_eq!(config.decoration.file_prefix, "📘 ");
        assert_eq!(config.templates.max_passes, 5);
    }

    #[test]
    fn regeneration_accepts_bool_and_date() {
        let config: SiteConfig = toml::from_str("regeneration = true").unwrap();
        assert_eq!(config.regeneration, RegenerationPolicy::ForceAll);

        let config: SiteConfig = toml::from_str("regeneration = false").unwrap();
        assert_eq!(config.regeneration, RegenerationPolicy::Normal);

        let config: SiteConfig = toml::from_str(r#"regeneration = "01/01/2024""#).unwrap();
        assert_eq!(
            config.regeneration,
            RegenerationPolicy::Since(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
    }

    #[test]
    fn regeneration_rejects_bad_date() {
        let result: Result<SiteConfig, _> = toml::from_str(r#"regeneration = "2024-01-01""#);
        assert!(result.is_err());
    }

    #[test]
    fn regeneration_date_survives_defaults_merge() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "regeneration = \"15/03/2023\"\n",
        )
        .unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(
            config.regeneration,
            RegenerationPolicy::Since(NaiveDate::from_ymd_opt(2023, 3, 15).unwrap())
        );
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str("colour = \"red\"");
        assert!(result.is_err());
    }

    #[test]
    fn extension_checks_ignore_case() {
        let config = SiteConfig::default();
        assert!(config.is_convertible("DOCX"));
        assert!(config.is_accepted("Pdf"));
        assert!(!config.is_copyable("docx"));
        assert!(config.is_script("py"));
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.site_title, "Documentation");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            r#"
site_title = "Mon site"
base_path = "/site/html"

[templates]
strict = true
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.site_title, "Mon site");
        assert_eq!(config.base_path, "/site/html");
        assert!(config.templates.strict);
        assert_eq!(config.templates.max_passes, 5);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "[templates]\nmax_passes = 0\n",
        )
        .unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn derived_extension_cannot_be_convertible() {
        let config = SiteConfig {
            derived_extension: "docx".to_string(),
            ..SiteConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn merge_toml_overlays_nested_tables() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = SiteConfig::default();
        assert_eq!(config.site_title, defaults.site_title);
        assert_eq!(config.accepted_extensions, defaults.accepted_extensions);
        assert_eq!(config.decoration.folder_prefix, defaults.decoration.folder_prefix);
        assert_eq!(config.converter.program, defaults.converter.program);
        assert_eq!(config.regeneration, defaults.regeneration);
    }
}
