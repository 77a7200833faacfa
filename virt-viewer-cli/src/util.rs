//! Shared start-up helpers used by both front-ends.

use clap::Parser;
use tokio::runtime::Runtime;
use virt_viewer_core::app::AppConfig;
use virt_viewer_core::config::{ConfigManager, Settings};
use virt_viewer_core::tracing::{TracingConfig, TracingLevel, init_tracing};

use crate::cli::CommonArgs;
use crate::error::{CliError, exit_codes};

/// Parses the command line, exiting on error
///
/// Usage errors exit with 1 instead of clap's 2; help and version output
/// exit with 0.
pub fn parse_args<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::GENERAL_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Loads persisted settings
///
/// Returns the manager too, or `None` when the home directory is unknown
/// and only the defaults apply.
pub fn load_settings() -> Result<(Option<ConfigManager>, Settings), CliError> {
    let Some(manager) = ConfigManager::new() else {
        return Ok((None, Settings::default()));
    };
    let settings = manager.load_settings()?;
    Ok((Some(manager), settings))
}

/// Sets up logging from the switches and settings
///
/// `RUST_LOG` overrides both when set.
pub fn init_logging(common: &CommonArgs, settings: &Settings) {
    let level = TracingLevel::from_flags(common.verbose, common.debug, settings.logging.level);
    if let Err(e) = init_tracing(&TracingConfig::new().with_level(level)) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

/// App options from settings overridden by the command line
pub fn app_config(program_name: &str, common: &CommonArgs, settings: &Settings) -> AppConfig {
    let mut config = AppConfig::from_settings(program_name, settings);
    if let Some(zoom) = common.zoom {
        config.zoom = zoom;
    }
    if common.full_screen {
        config.fullscreen = true;
    }
    config
}

/// Runtime the event loop and oVirt requests run on
pub fn runtime() -> Result<Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_overrides_settings() {
        let mut settings = Settings::default();
        settings.viewer.zoom = 150;
        let common = CommonArgs {
            full_screen: true,
            ..CommonArgs::default()
        };
        let config = app_config("virt-viewer", &common, &settings);
        assert_eq!(config.zoom, 150);
        assert!(config.fullscreen);

        let common = CommonArgs {
            zoom: Some(80),
            ..CommonArgs::default()
        };
        let config = app_config("remote-viewer", &common, &settings);
        assert_eq!(config.zoom, 80);
        assert_eq!(config.program_name, "remote-viewer");
    }
}
