//! Per-run log file and tracing setup
//!
//! Every status line of a run is written both to the console and to
//! `log_<YYYY-MM-DD_HH-MM>.txt`, which is uploaded once the run finishes.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{Error, Result};

/// Default console filter directive.
pub const DEFAULT_DIRECTIVE: &str = "tg_drive_backup=info";

/// The log file of the current run.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Create (truncating) the log file for a run started at `started_at`.
    pub fn create(dir: &Path, started_at: DateTime<Local>) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(started_at));
        let file = File::create(&path)?;
        Ok(Self { path, file })
    }

    pub fn file_name(started_at: DateTime<Local>) -> String {
        format!("log_{}.txt", started_at.format("%Y-%m-%d_%H-%M"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Plain-text layer writing INFO and above into the log file.
    pub fn layer<S>(&self) -> Result<impl Layer<S>>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let file = self.file.try_clone()?;
        Ok(fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
            .with_filter(LevelFilter::INFO))
    }
}

/// Install the global subscriber: console output filtered by `RUST_LOG`
/// and, when given, the run log file.
pub fn init_tracing(run_log: Option<&RunLog>) -> Result<()> {
    let directive = DEFAULT_DIRECTIVE
        .parse()
        .map_err(|e| Error::InvalidArgument(format!("invalid log directive: {}", e)))?;
    let console = fmt::layer().with_filter(EnvFilter::from_default_env().add_directive(directive));
    let file = run_log.map(RunLog::layer).transpose()?;

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::InvalidArgument(format!("logging already initialized: {}", e)))
}
