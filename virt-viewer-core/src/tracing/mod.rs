//! Logging initialisation
//!
//! The front-ends call [`init_tracing`] once at startup with the level picked
//! from `--verbose`/`--debug` and the settings file. `RUST_LOG` wins over
//! both when it is set.
//!
//! Protocol and HTTP libraries are noisy at `debug`, so their targets are
//! held at `warn` unless `RUST_LOG` asks for them explicitly.

use std::fs::File;
use std::path::PathBuf;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Library targets held at `warn`
const QUIET_TARGETS: &[&str] = &["vnc", "reqwest", "hyper", "hyper_util", "native_tls"];

static INSTALLED: OnceLock<TracingLevel> = OnceLock::new();

/// Logging could not be set up
#[derive(Debug, Error)]
pub enum TracingError {
    /// A subscriber is already installed
    #[error("Logging is already initialized at level {0}")]
    AlreadyInitialized(TracingLevel),

    /// The log file could not be opened
    #[error("Cannot open log file {path}: {source}")]
    LogFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The subscriber rejected the configuration
    #[error("Failed to initialize logging: {0}")]
    Subscriber(String),
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingLevel {
    /// Only errors
    Error,
    /// Errors and warnings
    #[default]
    Warn,
    /// Progress messages (`--verbose`)
    Info,
    /// Debug messages (`--debug`)
    Debug,
    /// Everything
    Trace,
}

impl TracingLevel {
    /// Level selected by the `--verbose`/`--debug` switches
    #[must_use]
    pub const fn from_flags(verbose: bool, debug: bool, fallback: Self) -> Self {
        if debug {
            Self::Debug
        } else if verbose {
            Self::Info
        } else {
            fallback
        }
    }

    /// Directive name understood by `EnvFilter`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Filter directives for this level with the library targets quietened
    #[must_use]
    pub fn directives(self) -> String {
        let mut directives = self.as_str().to_string();
        if self > Self::Warn {
            for target in QUIET_TARGETS {
                directives.push_str(&format!(",{target}=warn"));
            }
        }
        directives
    }
}

impl std::str::FromStr for TracingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl std::fmt::Display for TracingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// Standard error, shared with the terminal prompts
    #[default]
    Stderr,
    /// Standard output
    Stdout,
    /// A file, truncated on start
    File(PathBuf),
}

impl TracingOutput {
    fn writer(&self) -> Result<(BoxMakeWriter, bool), TracingError> {
        Ok(match self {
            Self::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
            Self::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
            Self::File(path) => {
                let file = File::create(path).map_err(|source| TracingError::LogFile {
                    path: path.clone(),
                    source,
                })?;
                (BoxMakeWriter::new(file), false)
            }
        })
    }
}

/// Logging options for one process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level used when `RUST_LOG` is unset
    pub level: TracingLevel,
    /// Destination
    pub output: TracingOutput,
}

impl TracingConfig {
    /// Warn-level logging to stderr
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the level
    #[must_use]
    pub const fn with_level(mut self, level: TracingLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the destination
    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.directives()))
    }
}

/// Installs the global subscriber
///
/// # Errors
///
/// Returns an error if logging was already set up in this process or the
/// log file cannot be opened.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingError> {
    if let Some(level) = INSTALLED.get() {
        return Err(TracingError::AlreadyInitialized(*level));
    }
    let (writer, ansi) = config.output.writer()?;

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(config.level >= TracingLevel::Debug)
                .with_ansi(ansi)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| TracingError::Subscriber(e.to_string()))?;

    let _ = INSTALLED.set(config.level);
    tracing::debug!(level = %config.level, output = ?config.output, "Logging initialized");
    Ok(())
}
