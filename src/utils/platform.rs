//! Platform-specific locations for Tubeloader
//!
//! - Application data (database): platform data dir
//! - Configuration (`settings.json`): platform config dir
//! - Downloads: `~/Downloads/Tubeloader`
//!
//! Every function accepts an optional override directory so tests and the
//! `--data-dir` flag can relocate all persisted state at once.

use std::path::{Path, PathBuf};
use tracing::debug;

const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "tubeloader.db";

/// Returns the application data directory
/// - macOS: ~/Library/Application Support/Tubeloader
/// - Windows: %APPDATA%\Tubeloader
/// - Linux: ~/.local/share/tubeloader
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(app_dir_name())
}

/// Returns the configuration directory
/// - macOS / Windows: same as [`app_data_dir`]
/// - Linux: ~/.config/tubeloader
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(app_dir_name())
    }

    #[cfg(not(target_os = "linux"))]
    {
        app_data_dir()
    }
}

/// Returns the default download directory
/// - All platforms: ~/Downloads/Tubeloader
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Tubeloader")
}

/// Path of `settings.json`, honouring an override directory
pub fn settings_path(override_dir: Option<&Path>) -> PathBuf {
    let path = match override_dir {
        Some(dir) => dir.join(SETTINGS_FILE),
        None => config_dir().join(SETTINGS_FILE),
    };
    debug!("Settings path: {:?}", path);
    path
}

/// Path of the SQLite store, honouring an override directory
pub fn database_path(override_dir: Option<&Path>) -> PathBuf {
    let path = match override_dir {
        Some(dir) => dir.join(DATABASE_FILE),
        None => app_data_dir().join(DATABASE_FILE),
    };
    debug!("Database path: {:?}", path);
    path
}

fn app_dir_name() -> &'static str {
    if cfg!(target_os = "linux") {
        "tubeloader"
    } else {
        "Tubeloader"
    }
}
