//! Utility modules for error handling, configuration and platform paths

pub mod clipboard;
pub mod config;
pub mod error;
pub mod platform;

// Re-export for convenience
pub use config::{AppSettings, DuplicatePolicy, MediaMode};
pub use error::{DownloadError, FailureKind, TubeloaderError};
pub use platform::{database_path, default_download_dir, settings_path};
