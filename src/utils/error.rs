//! Error handling for Tubeloader

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Tubeloader
#[derive(Debug, Error)]
pub enum TubeloaderError {
    #[error("yt-dlp not found. Please install yt-dlp")]
    YtDlpNotFound,

    #[error("Failed to extract video info: {0}")]
    ExtractionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {0} is already downloading and cannot be cancelled")]
    JobActive(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),
}

/// Why a single download failed.
///
/// The variant decides what happens to the job afterwards: only
/// [`DownloadError::Network`] failures are remembered for retry on the next
/// launch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DownloadError {
    /// Malformed, unsupported, private or removed link.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Network trouble or a yt-dlp failure that may go away on its own.
    #[error("download failed: {0}")]
    Network(String),

    /// Output could not be written (permissions, disk full, ...).
    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl DownloadError {
    /// Whether the failed job goes into the failed store for retry on next launch
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadError::Network(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            DownloadError::Extraction(_) => FailureKind::Extraction,
            DownloadError::Network(_) => FailureKind::Network,
            DownloadError::Filesystem(_) => FailureKind::Filesystem,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DownloadError::Extraction(m) | DownloadError::Network(m) | DownloadError::Filesystem(m) => m,
        }
    }

    /// Classify an `ERROR:` line printed by yt-dlp
    pub fn from_ytdlp_message(message: &str) -> Self {
        let msg = message
            .trim()
            .trim_start_matches("ERROR:")
            .trim()
            .to_string();
        let lower = msg.to_lowercase();

        const FILESYSTEM: [&str; 8] = [
            "no space left on device",
            "permission denied",
            "errno 28",
            "errno 13",
            "read-only file system",
            "unable to open for writing",
            "unable to create directory",
            "disk quota exceeded",
        ];
        const EXTRACTION: [&str; 11] = [
            "unsupported url",
            "is not a valid url",
            "incomplete youtube id",
            "video unavailable",
            "private video",
            "this video is",
            "has been removed",
            "sign in to confirm your age",
            "members-only",
            "does not exist",
            "this channel does not have",
        ];

        if FILESYSTEM.iter().any(|p| lower.contains(p)) {
            DownloadError::Filesystem(msg)
        } else if EXTRACTION.iter().any(|p| lower.contains(p)) {
            DownloadError::Extraction(msg)
        } else {
            DownloadError::Network(msg)
        }
    }

    /// Classify an I/O error raised on our side of the process boundary
    pub fn from_io(context: &str, err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::PermissionDenied | ErrorKind::AlreadyExists | ErrorKind::InvalidInput => {
                DownloadError::Filesystem(format!("{}: {}", context, err))
            }
            _ if err.raw_os_error() == Some(28) => {
                DownloadError::Filesystem(format!("{}: {}", context, err))
            }
            _ => DownloadError::Network(format!("{}: {}", context, err)),
        }
    }
}

/// Serializable tag for [`DownloadError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Extraction,
    Network,
    Filesystem,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Extraction => "extraction",
            FailureKind::Network => "network",
            FailureKind::Filesystem => "filesystem",
        }
    }
}
