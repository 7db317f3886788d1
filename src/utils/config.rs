//! Application configuration

use crate::utils::error::TubeloaderError;
use crate::utils::platform;
use anyhow::{Context, Result};
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 5;

pub const AUDIO_FORMATS: [&str; 6] = ["mp3", "aac", "wav", "flac", "m4a", "opus"];
pub const VIDEO_FORMATS: [&str; 3] = ["mp4", "mkv", "webm"];

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Download location
    pub output_folder: PathBuf,

    /// Number of downloads running at the same time (1-5)
    pub parallel_workers: usize,

    /// Per-download speed cap in KiB/s, 0 = unlimited
    pub speed_limit_kbps: u64,

    /// What to do when the target file already exists
    pub duplicate_policy: DuplicatePolicy,

    /// Mode used when a link is submitted without an explicit choice
    pub default_mode: MediaMode,

    /// Quality used when a link is submitted without an explicit choice
    pub default_quality: String,

    /// Audio codec for audio-mode downloads
    pub audio_format: String,

    /// Container for video-mode downloads
    pub video_format: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            output_folder: platform::default_download_dir(),
            parallel_workers: 3,
            speed_limit_kbps: 0,
            duplicate_policy: DuplicatePolicy::Ask,
            default_mode: MediaMode::Video,
            default_quality: "best".to_string(),
            audio_format: "mp3".to_string(),
            video_format: "mp4".to_string(),
        }
    }
}

impl AppSettings {
    /// Load settings from `path`.
    ///
    /// A missing file yields the defaults; an unreadable one is logged and
    /// replaced by the defaults so a bad edit never blocks startup.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        match serde_json::from_str::<AppSettings>(&content) {
            Ok(settings) => Ok(settings.normalized()),
            Err(e) => {
                warn!("Ignoring corrupt settings file {:?}: {}", path, e);
                Ok(Self::default())
            }
        }
    }

    /// Persist settings as pretty JSON, creating the parent directory
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Strict check used when the user changes a setting explicitly
    pub fn validate(&self) -> Result<(), TubeloaderError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.parallel_workers) {
            return Err(TubeloaderError::InvalidSetting(format!(
                "parallel_workers must be between {} and {}, got {}",
                MIN_WORKERS, MAX_WORKERS, self.parallel_workers
            )));
        }
        if !AUDIO_FORMATS.contains(&self.audio_format.as_str()) {
            return Err(TubeloaderError::InvalidSetting(format!(
                "unsupported audio format '{}'",
                self.audio_format
            )));
        }
        if !VIDEO_FORMATS.contains(&self.video_format.as_str()) {
            return Err(TubeloaderError::InvalidSetting(format!(
                "unsupported video format '{}'",
                self.video_format
            )));
        }
        if self.default_quality.trim().is_empty() {
            return Err(TubeloaderError::InvalidSetting(
                "default_quality must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Lenient fix-up used for values read from disk
    pub fn normalized(mut self) -> Self {
        self.parallel_workers = clamp_workers(self.parallel_workers);

        self.audio_format = self.audio_format.to_lowercase();
        if !AUDIO_FORMATS.contains(&self.audio_format.as_str()) {
            warn!("Unknown audio format '{}', using mp3", self.audio_format);
            self.audio_format = "mp3".to_string();
        }

        self.video_format = self.video_format.to_lowercase();
        if !VIDEO_FORMATS.contains(&self.video_format.as_str()) {
            warn!("Unknown video format '{}', using mp4", self.video_format);
            self.video_format = "mp4".to_string();
        }

        if self.default_quality.trim().is_empty() {
            self.default_quality = "best".to_string();
        }

        if let Ok(abs) = self.output_folder.absolutize() {
            self.output_folder = abs.into_owned();
        }

        self
    }

    /// Output container/codec for the given mode
    pub fn format_for(&self, mode: MediaMode) -> &str {
        match mode {
            MediaMode::Audio => &self.audio_format,
            MediaMode::Video => &self.video_format,
        }
    }
}

/// Clamp a requested worker count into the supported range
pub fn clamp_workers(n: usize) -> usize {
    n.clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Audio-only or audio+video download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    Audio,
    #[default]
    Video,
}

impl MediaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaMode::Audio => "audio",
            MediaMode::Video => "video",
        }
    }
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaMode {
    type Err = TubeloaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio" => Ok(MediaMode::Audio),
            "video" => Ok(MediaMode::Video),
            other => Err(TubeloaderError::InvalidSetting(format!(
                "unknown mode '{}'",
                other
            ))),
        }
    }
}

/// Handling of files that already exist in the output folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Leave the decision to yt-dlp's defaults
    #[default]
    Ask,
    Skip,
    Replace,
}

impl DuplicatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicatePolicy::Ask => "ask",
            DuplicatePolicy::Skip => "skip",
            DuplicatePolicy::Replace => "replace",
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicatePolicy {
    type Err = TubeloaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ask" => Ok(DuplicatePolicy::Ask),
            "skip" => Ok(DuplicatePolicy::Skip),
            "replace" => Ok(DuplicatePolicy::Replace),
            other => Err(TubeloaderError::InvalidSetting(format!(
                "unknown duplicate policy '{}'",
                other
            ))),
        }
    }
}
