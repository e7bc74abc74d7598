use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use docsite::config::{self, LogConfig, POLICY_DATE_FORMAT, RegenerationPolicy, SiteConfig};
use docsite::convert::{self, CommandConverter, Converter};
use docsite::logging::{self, LogGuard};
use docsite::pipeline::{self, BuildContext};
use docsite::sync::{self, SystemRunner};
use docsite::{output, repair};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn version_string() -> &'static str {
    let hash = env!("DOCSITE_GIT_HASH");
    if hash.is_empty() {
        env!("CARGO_PKG_VERSION")
    } else {
        // Leaked once at startup
        Box::leak(format!("{} ({hash})", env!("CARGO_PKG_VERSION")).into_boxed_str())
    }
}

#[derive(Parser)]
#[command(name = "docsite")]
#[command(about = "Static site builder for document collections")]
#[command(long_about = "\
Static site builder for document collections

Folders become index pages and documents become rows in them. Each folder
keeps a STRUCTURE.toml manifest with the order, labels and visibility of its
entries; the build only ever appends to it, so hand edits survive.

Source structure:

  docs/
  ├── config.toml                # Site config (optional)
  ├── STRUCTURE.toml             # Root manifest (created on first build)
  ├── entete_general.html        # Site-wide header fragment
  ├── pied_general.html          # Site-wide footer fragment
  ├── TDM/                       # Table of contents settings
  │   └── STRUCTURE.toml
  └── Cours/
      ├── STRUCTURE.toml
      ├── entete.html            # Folder header fragment
      ├── Leçon 1.docx           # Converted to lecon_1.pdf
      └── annexe.pdf

Labels accept {{source_name}}, {{source_stem}} and {{folder_title}}, plus
**bold**, __italic__, --underline--, ~~strike~~ and [rouge]color[/rouge].

Run 'docsite gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Source directory
    #[arg(long, default_value = "docs", global = true)]
    source: PathBuf,

    /// Output directory (wiped on every build)
    #[arg(long, default_value = "site", global = true)]
    output: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: scan → convert → render → copy
    Build,
    /// Show what a build would add to the manifests, without changing anything
    Check,
    /// Render only the table of contents
    Toc,
    /// Convert the documents of one folder, without building the site
    Convert {
        /// Folder to convert (defaults to --source)
        folder: Option<PathBuf>,
        /// Convert every document, even up-to-date ones
        #[arg(long)]
        force: bool,
        /// Also convert documents modified after this date (DD/MM/YYYY)
        #[arg(long, conflicts_with = "force", value_parser = parse_since)]
        since: Option<NaiveDate>,
    },
    /// Remove derived duplicates and replace `idem` labels in manifests
    Repair {
        /// Report the changes without saving them
        #[arg(long)]
        dry_run: bool,
    },
    /// Publish the output into a collaborator's git repository
    Sync {
        /// Log every mutating step instead of running it
        #[arg(long)]
        dry_run: bool,
        /// Sync configuration file
        #[arg(long, default_value = sync::SYNC_CONFIG_FILENAME)]
        config: PathBuf,
        /// Print a stock sync.toml with all options documented
        #[arg(long, conflicts_with = "dry_run")]
        print_config: bool,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Build => {
            let (config, _log) = site_run(&cli.source, "docsite build")?;
            let converter = CommandConverter::detect(&config.converter, &config.derived_extension);
            let ctx = BuildContext::new(cli.source, cli.output, config);
            let report = pipeline::build_site(&ctx, converter.as_ref().map(|c| c as &dyn Converter))?;
            output::print_build_summary(&report, &ctx.output_root);
        }
        Command::Check => {
            let (config, _log) = site_run(&cli.source, "docsite check")?;
            let ctx = BuildContext::new(cli.source, cli.output, config);
            let checks = pipeline::check_site(&ctx)?;
            output::print_check_output(&checks);
        }
        Command::Toc => {
            let (config, _log) = site_run(&cli.source, "docsite toc")?;
            let ctx = BuildContext::new(cli.source, cli.output, config);
            let page = pipeline::write_toc(&ctx)?;
            println!("Table of contents → {}", page.display());
        }
        Command::Convert { folder, force, since } => {
            let (mut config, _log) = site_run(&cli.source, "docsite convert")?;
            if force {
                config.regeneration = RegenerationPolicy::ForceAll;
            } else if let Some(date) = since {
                config.regeneration = RegenerationPolicy::Since(date);
            }
            let folder = folder.unwrap_or(cli.source);
            let Some(converter) =
                CommandConverter::detect(&config.converter, &config.derived_extension)
            else {
                eprintln!("error: no document converter found");
                return Ok(ExitCode::from(1));
            };
            let stats = convert::convert_standalone(&folder, &converter, &config)?;
            output::print_convert_summary(&stats, &folder);
        }
        Command::Repair { dry_run } => {
            let (config, _log) = site_run(&cli.source, "docsite repair")?;
            let summary = repair::repair_tree(&cli.source, &config, dry_run)?;
            output::print_repair_output(&summary, dry_run);
        }
        Command::Sync {
            print_config: true, ..
        } => {
            print!("{}", sync::stock_sync_config_toml());
        }
        Command::Sync { dry_run, config, .. } => {
            return run_sync(&config, dry_run);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn parse_since(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), POLICY_DATE_FORMAT)
        .map_err(|e| format!("{value:?} is not DD/MM/YYYY: {e}"))
}

/// Config and run log of a site command; a rejected config is logged with
/// the stock log settings.
fn site_run(source: &Path, command: &str) -> Result<(SiteConfig, LogGuard), logging::RunStartError> {
    let header = format!("{command} {}", version_string());
    logging::start_site_run(source, &header, &LogConfig::default())
}

/// Configuration problems exit with status 1 before anything is touched.
fn run_sync(config_path: &Path, dry_run: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = match sync::load_sync_config(config_path) {
        Ok(config) => config,
        Err(e) if e.is_config_error() => {
            eprintln!("error: {e}");
            return Ok(ExitCode::from(1));
        }
        Err(e) => return Err(e.into()),
    };
    let _log = logging::init(
        &config.logging.level,
        Some(config.logging.file.as_path()),
        &format!("docsite sync {}", version_string()),
    )?;
    let report = sync::run_sync(&config, &SystemRunner, dry_run)?;
    output::print_sync_output(&report);
    Ok(ExitCode::SUCCESS)
}
