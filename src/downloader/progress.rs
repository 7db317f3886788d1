//! Progress reporting and yt-dlp output parsing

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Marker for the machine-readable progress line requested with
/// `--progress-template`
pub const PROGRESS_MARKER: &str = "tubeloader-progress";

/// Value passed to `--progress-template`
pub fn progress_template() -> String {
    format!(
        "download:{}|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s",
        PROGRESS_MARKER
    )
}

/// One progress sample for a running job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Fraction complete, 0.0 to 1.0
    pub fraction: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// bytes per second
    pub speed: Option<f64>,
    pub eta: Option<Duration>,
}

impl DownloadProgress {
    pub fn new(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        let fraction = match total_bytes {
            Some(total) if total > 0 => (downloaded_bytes as f64 / total as f64).clamp(0.0, 1.0),
            _ => 0.0,
        };
        Self {
            fraction,
            downloaded_bytes,
            total_bytes,
            speed: None,
            eta: None,
        }
    }

    /// Get progress percentage (0.0 to 100.0)
    pub fn percentage(&self) -> f64 {
        self.fraction * 100.0
    }

    /// Single-line rendering for terminals: `42.5% | 1.2 MiB/s | ETA 0:07`
    pub fn status_text(&self) -> String {
        let speed = match self.speed {
            Some(s) if s > 0.0 => format_speed(s),
            _ => "-- KiB/s".to_string(),
        };
        let eta = match self.eta {
            Some(eta) => {
                let secs = eta.as_secs();
                format!(" | ETA {}:{:02}", secs / 60, secs % 60)
            }
            None => String::new(),
        };
        format!("{:5.1}% | {}{}", self.percentage(), speed, eta)
    }
}

fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 1024.0 * 1024.0 {
        format!("{:.1} MiB/s", bytes_per_sec / 1024.0 / 1024.0)
    } else {
        format!("{:.1} KiB/s", bytes_per_sec / 1024.0)
    }
}

/// A line of yt-dlp output we care about
#[derive(Debug, Clone, PartialEq)]
pub enum YtDlpLine {
    Progress(DownloadProgress),
    /// `[download] Destination: ...` - a real transfer is starting
    Destination(String),
    /// `[Merger] Merging formats into "..."`
    Merged(String),
    /// `[ExtractAudio] Destination: ...`
    Extracted(String),
    /// `[download] ... has already been downloaded`
    AlreadyDownloaded(String),
    Error(String),
    Other,
}

/// Parse one line of yt-dlp output (stdout or stderr)
pub fn parse_line(line: &str) -> YtDlpLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim();

    if trimmed.starts_with(PROGRESS_MARKER) {
        return parse_template_progress(trimmed)
            .map(YtDlpLine::Progress)
            .unwrap_or(YtDlpLine::Other);
    }
    if trimmed.starts_with("ERROR:") {
        return YtDlpLine::Error(trimmed.to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("[download] Destination:") {
        return YtDlpLine::Destination(rest.trim().to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("[Merger] Merging formats into") {
        return YtDlpLine::Merged(rest.trim().trim_matches('"').to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("[ExtractAudio] Destination:") {
        return YtDlpLine::Extracted(rest.trim().to_string());
    }
    if trimmed.starts_with("[download]") && trimmed.ends_with("has already been downloaded") {
        let path = trimmed
            .trim_start_matches("[download]")
            .trim_end_matches("has already been downloaded")
            .trim();
        return YtDlpLine::AlreadyDownloaded(path.to_string());
    }
    if let Some(progress) = parse_legacy_progress(trimmed) {
        return YtDlpLine::Progress(progress);
    }

    YtDlpLine::Other
}

/// `tubeloader-progress|downloaded|total|estimate|speed|eta`, fields may be `NA`
fn parse_template_progress(line: &str) -> Option<DownloadProgress> {
    let mut fields = line.split('|').skip(1);
    let downloaded = number(fields.next()?)?;
    let total = fields.next().and_then(number);
    let estimate = fields.next().and_then(number);
    let speed = fields.next().and_then(number);
    let eta = fields.next().and_then(number);

    let total = total.or(estimate).filter(|t| *t > 0.0).map(|t| t as u64);
    let mut progress = DownloadProgress::new(downloaded as u64, total);
    progress.speed = speed.filter(|s| *s >= 0.0);
    // NaN, inf and negative values carry no ETA
    progress.eta = eta.and_then(|e| Duration::try_from_secs_f64(e).ok());
    Some(progress)
}

fn number(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() || field == "NA" || field == "None" {
        return None;
    }
    field.parse::<f64>().ok()
}

fn legacy_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[download\]\s+(\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(\d+(?:\.\d+)?)([KMGT]?i?B))?(?:\s+at\s+(\d+(?:\.\d+)?)([KMGT]?i?B)/s)?(?:\s+ETA\s+(\d+(?::\d+){0,2}))?",
        )
        .expect("progress pattern is valid")
    })
}

/// Default human-readable progress line:
/// `[download]  42.5% of ~ 150.00MiB at  5.20MiB/s ETA 00:15`
fn parse_legacy_progress(line: &str) -> Option<DownloadProgress> {
    let caps = legacy_regex().captures(line)?;
    let pct: f64 = caps.get(1)?.as_str().parse().ok()?;

    let total = match (caps.get(2), caps.get(3)) {
        (Some(num), Some(unit)) => num
            .as_str()
            .parse::<f64>()
            .ok()
            .map(|n| (n * unit_multiplier(unit.as_str())) as u64),
        _ => None,
    };

    let speed = match (caps.get(4), caps.get(5)) {
        (Some(num), Some(unit)) => num
            .as_str()
            .parse::<f64>()
            .ok()
            .map(|n| n * unit_multiplier(unit.as_str())),
        _ => None,
    };

    let eta = caps.get(6).and_then(|m| parse_clock(m.as_str()));

    let fraction = (pct / 100.0).clamp(0.0, 1.0);
    Some(DownloadProgress {
        fraction,
        downloaded_bytes: total.map(|t| (t as f64 * fraction) as u64).unwrap_or(0),
        total_bytes: total,
        speed,
        eta,
    })
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1000.0,
        "MB" => 1000.0 * 1000.0,
        "GB" => 1000.0 * 1000.0 * 1000.0,
        _ => 1.0,
    }
}

/// `SS`, `MM:SS` or `HH:MM:SS`
fn parse_clock(clock: &str) -> Option<Duration> {
    let mut secs = 0u64;
    for part in clock.split(':') {
        secs = secs * 60 + part.parse::<u64>().ok()?;
    }
    Some(Duration::from_secs(secs))
}
