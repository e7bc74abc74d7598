//! Document converter trait and the office-suite implementation.
//!
//! The [`Converter`] trait is the seam between the build and whatever turns a
//! word-processor document into its published form. The production
//! implementation, [`CommandConverter`], drives an office suite in headless
//! mode (`soffice --headless --convert-to pdf`). Tests use a recording mock.
//!
//! Conversion is blocking and sequential. Each call waits for its child
//! process up to the configured timeout and kills it on expiry. A child that
//! cannot be killed is kept and retried by [`Converter::shutdown`] at the end
//! of the run.

use crate::config::ConverterConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{program} exited with {status} for {file}")]
    Failed {
        program: String,
        status: String,
        file: PathBuf,
    },
    #[error("conversion of {0} timed out after {1}s")]
    Timeout(PathBuf, u64),
    #[error("converter produced no output for {0}")]
    NoOutput(PathBuf),
}

/// Turns a source document into its derived form.
pub trait Converter {
    /// Short name for logs and summaries.
    fn name(&self) -> &str;

    /// Convert `source` and write the result to `dest`.
    fn convert(&self, source: &Path, dest: &Path) -> Result<(), ConvertError>;

    /// Best-effort cleanup of anything still running. Called once per run.
    fn shutdown(&self) {}
}

/// Office suite driven through its command line.
pub struct CommandConverter {
    program: PathBuf,
    target_extension: String,
    timeout: Duration,
    work_dir: PathBuf,
    lingering: Mutex<Vec<Child>>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl CommandConverter {
    /// Locate the configured program on `PATH`.
    ///
    /// Returns `None` (and logs it) when the program cannot be found; the
    /// build then runs with conversion disabled.
    pub fn detect(config: &ConverterConfig, target_extension: &str) -> Option<Self> {
        match which::which(&config.program) {
            Ok(program) => {
                info!(program = %program.display(), "document converter found");
                Some(Self::new(program, target_extension, config.timeout_secs))
            }
            Err(e) => {
                warn!(program = %config.program, "document conversion disabled: {e}");
                None
            }
        }
    }

    pub fn new(program: PathBuf, target_extension: &str, timeout_secs: u64) -> Self {
        Self {
            program,
            target_extension: target_extension.to_string(),
            timeout: Duration::from_secs(timeout_secs),
            work_dir: std::env::temp_dir().join(format!("docsite-convert-{}", std::process::id())),
            lingering: Mutex::new(Vec::new()),
        }
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    fn keep_lingering(&self, child: Child) {
        if let Ok(mut list) = self.lingering.lock() {
            list.push(child);
        }
    }

    /// Wait for `child` until the deadline, killing it on expiry.
    fn wait_with_timeout(&self, mut child: Child, source: &Path) -> Result<(), ConvertError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                return Err(ConvertError::Failed {
                    program: self.program_name(),
                    status: status.to_string(),
                    file: source.to_path_buf(),
                });
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        warn!(file = %source.display(), "conversion timed out, killing converter");
        match child.kill() {
            Ok(()) => {
                let _ = child.wait();
            }
            Err(e) => {
                warn!("could not kill converter: {e}");
                self.keep_lingering(child);
            }
        }
        Err(ConvertError::Timeout(
            source.to_path_buf(),
            self.timeout.as_secs(),
        ))
    }
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

impl Converter for CommandConverter {
    fn name(&self) -> &str {
        "office"
    }

    fn convert(&self, source: &Path, dest: &Path) -> Result<(), ConvertError> {
        fs::create_dir_all(&self.work_dir)?;

        debug!(program = %self.program.display(), file = %source.display(), "spawning converter");
        let child = Command::new(&self.program)
            .arg("--headless")
            .arg("--convert-to")
            .arg(&self.target_extension)
            .arg("--outdir")
            .arg(&self.work_dir)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        self.wait_with_timeout(child, source)?;

        // The suite names its output after the source stem, not ours.
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let produced = self
            .work_dir
            .join(format!("{stem}.{}", self.target_extension));
        if !produced.exists() {
            return Err(ConvertError::NoOutput(source.to_path_buf()));
        }
        move_file(&produced, dest)?;
        Ok(())
    }

    fn shutdown(&self) {
        let Ok(mut list) = self.lingering.lock() else {
            return;
        };
        for mut child in list.drain(..) {
            let pid = child.id();
            match child.kill().and_then(|()| child.wait()) {
                Ok(_) => info!(pid, "stopped lingering converter"),
                Err(e) => warn!(pid, "lingering converter could not be stopped: {e}"),
            }
        }
        let _ = fs::remove_dir_all(&self.work_dir);
    }
}
