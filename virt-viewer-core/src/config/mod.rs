//! Persisted user settings
//!
//! Settings live in `$XDG_CONFIG_HOME/virt-viewer/settings.toml`; every field
//! has a default so a missing or partial file is fine. Command-line options
//! override whatever is loaded here.

mod manager;
mod settings;

pub(crate) use manager::write_file;
pub use manager::{ConfigManager, RECENT_FILE, SETTINGS_FILE};
pub use settings::{LoggingSettings, Settings, SshSettings, ViewerSettings};
