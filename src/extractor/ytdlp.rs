//! yt-dlp discovery and metadata probing
//!
//! Supports a yt-dlp shipped next to the executable (app bundles, portable
//! builds) and system-installed yt-dlp.

use crate::extractor::models::VideoInfo;
use crate::utils::error::TubeloaderError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, error, info, warn};

#[cfg(windows)]
const YTDLP_BINARY: &str = "yt-dlp.exe";
#[cfg(not(windows))]
const YTDLP_BINARY: &str = "yt-dlp";

/// Metadata probe backed by yt-dlp
pub struct VideoExtractor {
    ytdlp_path: PathBuf,
}

impl VideoExtractor {
    /// Initialize extractor and verify yt-dlp availability
    pub fn new() -> Result<Self, TubeloaderError> {
        let ytdlp_path = find_ytdlp().ok_or_else(|| {
            error!("yt-dlp not found anywhere!");
            TubeloaderError::YtDlpNotFound
        })?;
        Ok(Self { ytdlp_path })
    }

    /// Use an explicit yt-dlp binary
    pub fn with_path(ytdlp_path: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
        }
    }

    /// Extract video information without downloading
    /// Uses: yt-dlp --dump-json --no-download
    pub async fn extract_info(&self, url: &str) -> Result<VideoInfo> {
        debug!("Extracting video info for URL: {}", url);

        let output = AsyncCommand::new(&self.ytdlp_path)
            .arg("--dump-json")
            .arg("--no-download")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg(url)
            .output()
            .await?;

        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            error!("yt-dlp extraction failed: {}", error_msg.trim());
            return Err(TubeloaderError::ExtractionError(error_msg.trim().to_string()).into());
        }

        let json_str = String::from_utf8(output.stdout)?;
        let first_line = json_str.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        let video_info: VideoInfo = serde_json::from_str(first_line)?;

        Ok(video_info)
    }

    /// List the entries of a playlist or channel without resolving formats
    /// Uses: yt-dlp --flat-playlist --dump-json
    pub async fn extract_playlist(&self, url: &str) -> Result<Vec<VideoInfo>> {
        debug!("Extracting playlist info for URL: {}", url);

        let output = AsyncCommand::new(&self.ytdlp_path)
            .arg("--flat-playlist")
            .arg("--dump-json")
            .arg("--no-warnings")
            .arg(url)
            .output()
            .await?;

        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            error!("yt-dlp playlist extraction failed: {}", error_msg.trim());
            return Err(TubeloaderError::ExtractionError(error_msg.trim().to_string()).into());
        }

        let json_str = String::from_utf8(output.stdout)?;
        let mut videos = Vec::new();

        for line in json_str.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<VideoInfo>(line) {
                Ok(video) => videos.push(video),
                Err(e) => {
                    // Keep the entries that did parse
                    warn!("Failed to parse playlist entry: {}", e);
                }
            }
        }

        Ok(videos)
    }

    /// Get the path to yt-dlp being used
    pub fn ytdlp_path(&self) -> &Path {
        &self.ytdlp_path
    }
}

/// Find yt-dlp binary with priority:
/// 1. Bundled (next to the executable, or in a macOS .app Resources dir)
/// 2. System PATH
/// 3. Common installation paths
pub fn find_ytdlp() -> Option<PathBuf> {
    if let Some(bundled) = find_bundled_ytdlp() {
        info!("Using bundled yt-dlp: {:?}", bundled);
        return Some(bundled);
    }

    if let Ok(system) = which::which(YTDLP_BINARY) {
        info!("Using system yt-dlp: {:?}", system);
        return Some(system);
    }

    if let Some(common) = find_in_common_paths() {
        info!("Using yt-dlp from common path: {:?}", common);
        return Some(common);
    }

    warn!("yt-dlp not found anywhere!");
    None
}

fn find_bundled_ytdlp() -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;

    // Tubeloader.app/Contents/MacOS/tubeloader -> Contents/Resources/bin/yt-dlp
    if exe_dir.ends_with("MacOS") {
        let bundled = exe_dir
            .parent()?
            .join("Resources")
            .join("bin")
            .join(YTDLP_BINARY);
        if is_executable(&bundled) {
            return Some(bundled);
        }
    }

    let sibling = exe_dir.join(YTDLP_BINARY);
    if is_executable(&sibling) {
        return Some(sibling);
    }

    None
}

fn find_in_common_paths() -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("/opt/homebrew/bin/yt-dlp"),
        PathBuf::from("/usr/local/bin/yt-dlp"),
        PathBuf::from("/usr/bin/yt-dlp"),
        PathBuf::from("/Library/Frameworks/Python.framework/Versions/Current/bin/yt-dlp"),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local").join("bin").join("yt-dlp"));
    }

    candidates.into_iter().find(|p| is_executable(p))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
