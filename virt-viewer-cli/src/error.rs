//! CLI error types and exit codes.

use virt_viewer_core::error::{
    AppError, ConfigError, OvirtError, UriError, VirtViewerError, VvFileError,
};

/// Exit codes for CLI operations
pub mod exit_codes {
    /// Normal exit after the event loop terminated, or help/version output
    pub const SUCCESS: i32 = 0;
    /// Usage error or unrecoverable startup failure
    pub const GENERAL_ERROR: i32 = 1;
}

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Bad command line
    #[error("{0}")]
    Usage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Feature not built into this program
    #[error("{0}")]
    Unavailable(String),

    /// Connection target could not be resolved
    #[error("{0}")]
    Connection(String),

    /// Startup failed and the user has already been told why
    #[error("Unable to start the connection")]
    Reported,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VirtViewerError> for CliError {
    fn from(err: VirtViewerError) -> Self {
        match err {
            VirtViewerError::Config(e) => Self::Config(e.to_string()),
            VirtViewerError::Uri(e) => Self::Usage(e.to_string()),
            other => Self::Connection(other.to_string()),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        VirtViewerError::from(err).into()
    }
}

impl From<UriError> for CliError {
    fn from(err: UriError) -> Self {
        VirtViewerError::from(err).into()
    }
}

impl From<VvFileError> for CliError {
    fn from(err: VvFileError) -> Self {
        VirtViewerError::from(err).into()
    }
}

impl From<OvirtError> for CliError {
    fn from(err: OvirtError) -> Self {
        VirtViewerError::from(err).into()
    }
}

impl From<AppError> for CliError {
    fn from(err: AppError) -> Self {
        VirtViewerError::from(err).into()
    }
}

impl CliError {
    /// Returns the process exit code for this error.
    ///
    /// Every failure exits with 1; 0 is reserved for a normal exit.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_)
            | Self::Config(_)
            | Self::Unavailable(_)
            | Self::Connection(_)
            | Self::Reported
            | Self::Io(_) => exit_codes::GENERAL_ERROR,
        }
    }

    /// Whether the message still needs printing
    #[must_use]
    pub const fn needs_report(&self) -> bool {
        !matches!(self, Self::Reported)
    }
}
