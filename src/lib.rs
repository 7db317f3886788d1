//! Tubeloader library

pub mod backend;
pub mod database;
pub mod downloader;
pub mod extractor;
pub mod queue;
pub mod utils;

// Re-export main types for easier use
pub use backend::{BackendActor, BackendCommand, BackendEvent};
pub use database::{DatabaseManager, FailedEntry, HistoryRecord};
pub use downloader::{
    DownloadBackend, DownloadOutcome, DownloadProgress, DownloadRequest, YtDlpEngine,
};
pub use extractor::{classify, extract, ClassifiedUrl, LinkKind, VideoExtractor, VideoInfo};
pub use queue::{Job, JobStatus, QueueEvent, QueueManager};
pub use utils::{AppSettings, DownloadError, DuplicatePolicy, MediaMode, TubeloaderError};
