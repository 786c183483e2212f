//! Log output for the `calsync` binary.
//!
//! Human-readable lines go to stderr. A log file, when configured, receives
//! the same events without ANSI colors. `RUST_LOG` replaces the default
//! filter.
//!
//! Keep the [`TracingGuard`] alive for the whole run, or buffered file lines
//! are dropped.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Crates whose events pass the default filter.
const CRATES: [&str; 4] = ["calsync", "calsync_cli", "calsync_core", "calsync_providers"];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("cannot open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for calsync's own crates when `RUST_LOG` is unset.
    pub level: Level,
    /// Adds module path and source location to stderr lines.
    pub verbose: bool,
    /// Explicit filter directive. Takes precedence over `RUST_LOG`.
    pub filter: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            verbose: false,
            filter: None,
            log_file: None,
        }
    }
}

impl TracingConfig {
    /// Settings for `--debug`.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            verbose: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Filter used when neither `filter` nor `RUST_LOG` is set.
    pub fn default_directive(&self) -> String {
        let level = self.level.to_string().to_ascii_lowercase();
        CRATES
            .iter()
            .map(|krate| format!("{}={}", krate, level))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.filter {
            Some(directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))),
        }
    }
}

/// Flushes the log file writer when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber. Call once, before any other logging.
pub fn init_tracing(config: TracingConfig) -> Result<TracingGuard, TracingError> {
    let filter = config.env_filter()?;

    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.verbose)
        .with_file(config.verbose)
        .with_line_number(config.verbose)
        .compact()
        .boxed();
    let mut layers: Vec<BoxedLayer> = vec![stderr];

    let guard = match &config.log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_append(path)?);
            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layers).with(filter))?;
    Ok(TracingGuard { _file: guard })
}

fn open_append(path: &Path) -> Result<File, TracingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TracingError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}
