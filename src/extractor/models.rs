//! Data structures for video information

use serde::{Deserialize, Serialize};

/// Metadata reported by `yt-dlp --dump-json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Page URL of the video
    #[serde(default)]
    pub webpage_url: Option<String>,
    /// Set on flat playlist entries, or the media URL for single-format picks
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub duration_string: Option<String>,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub upload_date: Option<String>,
    pub view_count: Option<u64>,
    pub playlist_count: Option<u64>,
    pub extractor: Option<String>,
}

impl VideoInfo {
    /// `mm:ss` / `h:mm:ss`, preferring yt-dlp's own rendering
    pub fn display_duration(&self) -> String {
        if let Some(s) = &self.duration_string {
            return s.clone();
        }
        match self.duration {
            Some(d) if d >= 0.0 => {
                let total = d.round() as u64;
                let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
                if h > 0 {
                    format!("{}:{:02}:{:02}", h, m, s)
                } else {
                    format!("{}:{:02}", m, s)
                }
            }
            _ => "--:--".to_string(),
        }
    }

    /// Best link back to the video page
    pub fn page_url(&self) -> Option<&str> {
        self.webpage_url.as_deref().or(self.url.as_deref())
    }

    pub fn display_uploader(&self) -> &str {
        self.uploader
            .as_deref()
            .or(self.channel.as_deref())
            .unwrap_or("Unknown")
    }
}
