//! Translation of a download request into yt-dlp arguments

use crate::downloader::progress::progress_template;
use crate::extractor::LinkKind;
use crate::utils::config::{AppSettings, DuplicatePolicy, MediaMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything the engine needs to run one job.
///
/// Built from the job plus a snapshot of the settings taken at dispatch
/// time, so a settings change never affects a download already running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub kind: LinkKind,
    pub mode: MediaMode,
    /// `best`, `1080p`, ... or a raw yt-dlp format selector
    pub quality: String,
    /// Audio codec or video container
    pub format: String,
    pub output_folder: PathBuf,
    /// KiB/s, 0 = unlimited
    pub speed_limit_kbps: u64,
    pub duplicate_policy: DuplicatePolicy,
}

impl DownloadRequest {
    /// Fill the request from settings where the job left a choice open
    pub fn from_settings(
        url: &str,
        kind: LinkKind,
        mode: MediaMode,
        quality: Option<&str>,
        format: Option<&str>,
        settings: &AppSettings,
    ) -> Self {
        let quality = quality
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(match mode {
                MediaMode::Audio => "best",
                MediaMode::Video => settings.default_quality.as_str(),
            })
            .to_string();
        let format = format
            .filter(|f| !f.trim().is_empty())
            .map(|f| f.to_lowercase())
            .unwrap_or_else(|| settings.format_for(mode).to_string());

        Self {
            url: url.to_string(),
            kind,
            mode,
            quality,
            format,
            output_folder: settings.output_folder.clone(),
            speed_limit_kbps: settings.speed_limit_kbps,
            duplicate_policy: settings.duplicate_policy,
        }
    }

    /// Full yt-dlp argument vector, URL last
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--newline".into(),
            "--progress".into(),
            "--progress-template".into(),
            progress_template(),
            "--no-color".into(),
            "--continue".into(),
            "--socket-timeout".into(),
            "30".into(),
            "--retries".into(),
            "10".into(),
            "--fragment-retries".into(),
            "10".into(),
            "--retry-sleep".into(),
            "http:linear=5::5".into(),
            "--force-ipv4".into(),
            "--embed-metadata".into(),
            "-o".into(),
            self.output_template(),
        ];

        if self.kind.is_collection() {
            // One dead entry must not abort the rest of the collection
            args.push("--yes-playlist".into());
            args.push("--ignore-errors".into());
        } else {
            args.push("--no-playlist".into());
        }

        if self.speed_limit_kbps > 0 {
            args.push("--limit-rate".into());
            args.push(format!("{}K", self.speed_limit_kbps));
        }

        match self.duplicate_policy {
            DuplicatePolicy::Skip => args.push("--no-overwrites".into()),
            DuplicatePolicy::Replace => args.push("--force-overwrites".into()),
            DuplicatePolicy::Ask => {}
        }

        match self.mode {
            MediaMode::Audio => {
                let codec = audio_codec(&self.format);
                args.extend([
                    "-f".into(),
                    "bestaudio/best".into(),
                    "-x".into(),
                    "--audio-format".into(),
                    codec.into(),
                    "--audio-quality".into(),
                    if codec == "mp3" { "320K" } else { "0" }.into(),
                ]);
            }
            MediaMode::Video => {
                args.extend([
                    "-f".into(),
                    format_selector(&self.quality),
                    "--merge-output-format".into(),
                    video_container(&self.format).into(),
                ]);
            }
        }

        args.push(self.url.clone());
        args
    }

    /// `-o` value; playlists and channels get their own sub-folder
    pub fn output_template(&self) -> String {
        let folder = self.output_folder.to_string_lossy();
        let sep = std::path::MAIN_SEPARATOR;
        if self.kind.is_collection() {
            format!("{}{}%(playlist_title)s{}%(title)s.%(ext)s", folder, sep, sep)
        } else {
            format!("{}{}%(title)s.%(ext)s", folder, sep)
        }
    }
}

/// yt-dlp format selector for a quality label.
///
/// `best` and unknown labels take the best streams; `<N>p` caps the height;
/// anything that already looks like a selector is passed through.
pub fn format_selector(quality: &str) -> String {
    let q = quality.trim().to_lowercase();
    if q.is_empty() || q == "best" {
        return "bestvideo+bestaudio/best".to_string();
    }
    if let Some(height) = q.strip_suffix('p').and_then(|h| h.parse::<u32>().ok()) {
        return format!(
            "bestvideo[height<={h}]+bestaudio/best[height<={h}]/best",
            h = height
        );
    }
    if q.contains('+') || q.contains('/') || q.contains('[') || q.starts_with("worst") {
        return quality.trim().to_string();
    }
    "bestvideo+bestaudio/best".to_string()
}

fn audio_codec(format: &str) -> &'static str {
    match format {
        "aac" => "aac",
        "wav" => "wav",
        "flac" => "flac",
        "m4a" => "m4a",
        "opus" => "opus",
        _ => "mp3",
    }
}

fn video_container(format: &str) -> &'static str {
    match format {
        "mkv" => "mkv",
        "webm" => "webm",
        _ => "mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mode: MediaMode) -> DownloadRequest {
        let mut settings = AppSettings::default();
        settings.output_folder = PathBuf::from("/downloads");
        DownloadRequest::from_settings(
            "https://www.youtube.com/watch?v=abc",
            LinkKind::Video,
            mode,
            None,
            None,
            &settings,
        )
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn format_selector_by_quality() {
        assert_eq!(format_selector("best"), "bestvideo+bestaudio/best");
        assert_eq!(
            format_selector("720p"),
            "bestvideo[height<=720]+bestaudio/best[height<=720]/best"
        );
        assert_eq!(
            format_selector("2160P"),
            "bestvideo[height<=2160]+bestaudio/best[height<=2160]/best"
        );
        assert_eq!(format_selector("137+140"), "137+140");
        assert_eq!(format_selector("gibberish"), "bestvideo+bestaudio/best");
    }

    #[test]
    fn video_request_args() {
        let args = request(MediaMode::Video).to_args();
        assert!(args.contains(&"--continue".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(!args.contains(&"--ignore-errors".to_string()));
        assert!(has_pair(&args, "-f", "bestvideo+bestaudio/best"));
        assert!(has_pair(&args, "--merge-output-format", "mp4"));
        assert!(!args.contains(&"--limit-rate".to_string()));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn audio_request_args() {
        let mut req = request(MediaMode::Audio);
        req.format = "flac".to_string();
        let args = req.to_args();
        assert!(has_pair(&args, "-f", "bestaudio/best"));
        assert!(has_pair(&args, "--audio-format", "flac"));
        assert!(has_pair(&args, "--audio-quality", "0"));
        assert!(args.contains(&"-x".to_string()));

        let mp3 = request(MediaMode::Audio).to_args();
        assert!(has_pair(&mp3, "--audio-quality", "320K"));
    }

    #[test]
    fn speed_limit_and_duplicate_policy() {
        let mut req = request(MediaMode::Video);
        req.speed_limit_kbps = 750;
        req.duplicate_policy = DuplicatePolicy::Skip;
        let args = req.to_args();
        assert!(has_pair(&args, "--limit-rate", "750K"));
        assert!(args.contains(&"--no-overwrites".to_string()));

        req.duplicate_policy = DuplicatePolicy::Replace;
        assert!(req.to_args().contains(&"--force-overwrites".to_string()));
    }

    #[test]
    fn playlist_output_goes_to_subfolder() {
        let mut req = request(MediaMode::Video);
        req.kind = LinkKind::Playlist;
        let args = req.to_args();
        assert!(args.contains(&"--yes-playlist".to_string()));
        assert!(args.contains(&"--ignore-errors".to_string()));
        assert!(req.output_template().contains("%(playlist_title)s"));
    }

    #[test]
    fn explicit_choices_override_settings() {
        let settings = AppSettings::default();
        let req = DownloadRequest::from_settings(
            "https://youtu.be/x",
            LinkKind::Video,
            MediaMode::Video,
            Some("480p"),
            Some("MKV"),
            &settings,
        );
        assert_eq!(req.quality, "480p");
        assert_eq!(req.format, "mkv");
        assert_eq!(req.duplicate_policy, settings.duplicate_policy);
    }
}
