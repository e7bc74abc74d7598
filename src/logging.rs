//! Console and run-log output.
//!
//! A run installs one subscriber for its duration: `tracing` events go to
//! stderr and, when a log file is configured, to that file as plain text.
//! The file is truncated at the start of every run and begins with a header
//! line naming the command. `RUST_LOG` overrides the configured level.
//!
//! Site commands go through [`start_site_run`], which also logs a rejected
//! `config.toml` with the stock log settings before giving up.

use crate::config::{self, ConfigError, LogConfig, SiteConfig};
use chrono::Local;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::error;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the run's subscriber installed until dropped.
pub struct LogGuard {
    _default: DefaultGuard,
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the run subscriber. `header` is the first line of the log file.
pub fn init(level: &str, file: Option<&Path>, header: &str) -> io::Result<LogGuard> {
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time();

    let file_layer = match file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut log = File::create(path)?;
            writeln!(log, "{header} | {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(log))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter_for(level))
        .with(console)
        .with(file_layer);

    Ok(LogGuard {
        _default: tracing::subscriber::set_default(subscriber),
    })
}

/// Install the subscriber described by a `[log]` section. An empty `file`
/// logs to the console only.
pub fn init_from(config: &LogConfig, header: &str) -> io::Result<LogGuard> {
    let file = (!config.file.is_empty()).then(|| Path::new(&config.file));
    init(&config.level, file, header)
}

#[derive(Error, Debug)]
pub enum RunStartError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("Cannot open run log: {0}")]
    Io(#[from] io::Error),
}

/// Load the site config of `source` and install its run subscriber.
///
/// When the config is rejected, a subscriber built from `fallback` records
/// the error first.
pub fn start_site_run(
    source: &Path,
    header: &str,
    fallback: &LogConfig,
) -> Result<(SiteConfig, LogGuard), RunStartError> {
    match config::load_config(source) {
        Ok(config) => {
            let guard = init_from(&config.log, header)?;
            Ok((config, guard))
        }
        Err(e) => {
            let _guard = init_from(fallback, header)?;
            error!(source = %source.display(), "configuration rejected: {e}");
            Err(e.into())
        }
    }
}
