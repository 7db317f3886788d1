//! Queued download jobs

use crate::downloader::DownloadRequest;
use crate::extractor::{ClassifiedUrl, LinkKind};
use crate::utils::config::{AppSettings, MediaMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a live job.
///
/// Pausing is a queue-level flag; a job waiting behind a paused queue stays
/// `Pending`. Finished jobs leave the queue and are reported through
/// `QueueEvent::JobCompleted`, `JobSkipped` or `JobFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Active,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Active => "active",
        }
    }
}

/// One link waiting for, or going through, a download slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub url: String,
    pub kind: LinkKind,
    pub mode: MediaMode,
    /// Falls back to the settings when `None`
    pub quality: Option<String>,
    /// Audio codec or video container, falls back to the settings when `None`
    pub format: Option<String>,
    pub status: JobStatus,
    /// 0.0 to 1.0
    pub progress: f64,
    /// bytes per second
    pub speed: Option<f64>,
    /// seconds
    pub eta: Option<u64>,
    pub added_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job
    pub fn new(
        url: impl Into<String>,
        kind: LinkKind,
        mode: MediaMode,
        quality: Option<String>,
        format: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            kind,
            mode,
            quality,
            format,
            status: JobStatus::Pending,
            progress: 0.0,
            speed: None,
            eta: None,
            added_at: Utc::now(),
        }
    }

    pub fn from_link(
        link: &ClassifiedUrl,
        mode: MediaMode,
        quality: Option<&str>,
        format: Option<&str>,
    ) -> Self {
        Self::new(
            link.url.clone(),
            link.kind,
            mode,
            quality.map(str::to_string),
            format.map(str::to_string),
        )
    }

    /// Engine request for this job under `settings`
    pub fn request(&self, settings: &AppSettings) -> DownloadRequest {
        DownloadRequest::from_settings(
            &self.url,
            self.kind,
            self.mode,
            self.quality.as_deref(),
            self.format.as_deref(),
            settings,
        )
    }
}
