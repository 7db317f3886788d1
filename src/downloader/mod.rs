//! Download engine module

pub mod engine;
pub mod options;
pub mod progress;

// Re-export for convenience
pub use engine::{DownloadBackend, DownloadOutcome, ProgressSink, YtDlpEngine};
pub use options::{format_selector, DownloadRequest};
pub use progress::{parse_line, DownloadProgress, YtDlpLine};
