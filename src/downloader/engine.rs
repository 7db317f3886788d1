//! Download engine: one yt-dlp process per job

use crate::downloader::options::DownloadRequest;
use crate::downloader::progress::{parse_line, DownloadProgress, YtDlpLine};
use crate::extractor::ytdlp::find_ytdlp;
use crate::utils::config::DuplicatePolicy;
use crate::utils::error::{DownloadError, TubeloaderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as AsyncCommand;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sending half of a job's progress stream
pub type ProgressSink = mpsc::UnboundedSender<DownloadProgress>;

/// Terminal result of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DownloadOutcome {
    Completed {
        title: String,
        /// The file for single links, the target folder for collections
        output_path: PathBuf,
        files: Vec<PathBuf>,
    },
    /// Nothing was transferred because the files already existed
    Skipped {
        title: String,
        output_path: PathBuf,
        reason: String,
    },
}

impl DownloadOutcome {
    pub fn title(&self) -> &str {
        match self {
            DownloadOutcome::Completed { title, .. } | DownloadOutcome::Skipped { title, .. } => {
                title
            }
        }
    }

    pub fn output_path(&self) -> &Path {
        match self {
            DownloadOutcome::Completed { output_path, .. }
            | DownloadOutcome::Skipped { output_path, .. } => output_path,
        }
    }
}

/// Something that can carry out a download request.
///
/// The worker pool only talks to this trait, which keeps it independent of
/// yt-dlp and lets tests drive the pool with scripted backends.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Short identifier for logs
    fn id(&self) -> &'static str;

    /// Run the request to completion, pushing progress samples into `progress`.
    ///
    /// Dropping `progress` when done ends the job's progress stream.
    async fn run(
        &self,
        request: &DownloadRequest,
        progress: ProgressSink,
    ) -> Result<DownloadOutcome, DownloadError>;
}

/// [`DownloadBackend`] backed by the yt-dlp executable
pub struct YtDlpEngine {
    ytdlp_path: PathBuf,
}

impl YtDlpEngine {
    /// Locate yt-dlp and create the engine
    pub fn new() -> Result<Self, TubeloaderError> {
        let ytdlp_path = find_ytdlp().ok_or(TubeloaderError::YtDlpNotFound)?;
        Ok(Self { ytdlp_path })
    }

    pub fn with_path(ytdlp_path: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
        }
    }

    pub fn ytdlp_path(&self) -> &Path {
        &self.ytdlp_path
    }
}

#[async_trait]
impl DownloadBackend for YtDlpEngine {
    fn id(&self) -> &'static str {
        "yt-dlp"
    }

    async fn run(
        &self,
        request: &DownloadRequest,
        progress: ProgressSink,
    ) -> Result<DownloadOutcome, DownloadError> {
        tokio::fs::create_dir_all(&request.output_folder)
            .await
            .map_err(|e| DownloadError::from_io("create output folder", &e))?;

        let args = request.to_args();
        debug!("{} {}", self.ytdlp_path.display(), args.join(" "));

        let mut child = AsyncCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::from_io("spawn yt-dlp", &e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Network("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Network("yt-dlp stderr unavailable".to_string()))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut tracker = OutputTracker::default();
        let mut stdout_done = false;
        let mut stderr_done = false;

        // yt-dlp splits progress and messages across both streams
        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = out_lines.next_line(), if !stdout_done => match line {
                    Ok(Some(line)) => {
                        if let Some(p) = tracker.observe(&line) {
                            let _ = progress.send(p);
                        }
                    }
                    Ok(None) => stdout_done = true,
                    Err(e) => {
                        warn!("Error reading yt-dlp stdout: {}", e);
                        stdout_done = true;
                    }
                },
                line = err_lines.next_line(), if !stderr_done => match line {
                    Ok(Some(line)) => {
                        if let Some(p) = tracker.observe(&line) {
                            let _ = progress.send(p);
                        }
                    }
                    Ok(None) => stderr_done = true,
                    Err(e) => {
                        warn!("Error reading yt-dlp stderr: {}", e);
                        stderr_done = true;
                    }
                },
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::from_io("wait for yt-dlp", &e))?;
        debug!("yt-dlp exited with {:?} for {}", status.code(), request.url);

        let outcome = tracker.finish(status.success(), status.code(), request)?;
        info!("Finished {} -> {:?}", request.url, outcome.output_path());
        Ok(outcome)
    }
}

/// Folds yt-dlp output lines into the final outcome
#[derive(Debug, Default)]
struct OutputTracker {
    files: Vec<PathBuf>,
    already_present: Vec<PathBuf>,
    transferred: bool,
    errors: Vec<String>,
    last_line: Option<String>,
}

impl OutputTracker {
    fn observe(&mut self, line: &str) -> Option<DownloadProgress> {
        if !line.trim().is_empty() {
            self.last_line = Some(line.trim().to_string());
        }

        match parse_line(line) {
            YtDlpLine::Progress(p) => return Some(p),
            YtDlpLine::Destination(path) => {
                self.transferred = true;
                if !is_format_fragment(&path) {
                    self.push_file(PathBuf::from(path));
                }
            }
            YtDlpLine::Merged(path) => self.push_file(PathBuf::from(path)),
            YtDlpLine::Extracted(path) => {
                let path = PathBuf::from(path);
                // title.webm -> title.mp3
                let replaces_last = self
                    .files
                    .last()
                    .map(|last| last.file_stem() == path.file_stem())
                    .unwrap_or(false);
                if replaces_last {
                    self.files.pop();
                }
                self.push_file(path);
            }
            YtDlpLine::AlreadyDownloaded(path) => self.already_present.push(PathBuf::from(path)),
            YtDlpLine::Error(msg) => {
                warn!("yt-dlp: {}", msg);
                self.errors.push(msg);
            }
            YtDlpLine::Other => {}
        }
        None
    }

    fn push_file(&mut self, path: PathBuf) {
        if !self.files.contains(&path) {
            self.files.push(path);
        }
    }

    fn finish(
        self,
        success: bool,
        code: Option<i32>,
        request: &DownloadRequest,
    ) -> Result<DownloadOutcome, DownloadError> {
        if !success {
            let kept = self.files.len() + self.already_present.len();
            // With --ignore-errors a collection exits non-zero when any entry failed
            if request.kind.is_collection() && kept > 0 {
                warn!(
                    "{} entries of {} failed, keeping {} finished files",
                    self.errors.len().max(1),
                    request.url,
                    kept
                );
            } else {
                return Err(match self.errors.first() {
                    Some(first) => DownloadError::from_ytdlp_message(first),
                    None => DownloadError::Network(format!(
                        "yt-dlp exited with status {}{}",
                        code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()),
                        self.last_line
                            .map(|l| format!(": {}", l))
                            .unwrap_or_default()
                    )),
                });
            }
        }

        if request.duplicate_policy == DuplicatePolicy::Skip
            && !self.transferred
            && !self.already_present.is_empty()
        {
            let output_path = self.already_present[0].clone();
            return Ok(DownloadOutcome::Skipped {
                title: title_for(&self.already_present, request),
                output_path,
                reason: "File already exists".to_string(),
            });
        }

        let mut files = self.files;
        for path in self.already_present {
            if !files.contains(&path) {
                files.push(path);
            }
        }

        let output_path = match files.as_slice() {
            [single] if !request.kind.is_collection() => single.clone(),
            [first, ..] => first
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| request.output_folder.clone()),
            [] => request.output_folder.clone(),
        };

        Ok(DownloadOutcome::Completed {
            title: title_for(&files, request),
            output_path,
            files,
        })
    }
}

/// Title from the output file name (the template is `%(title)s.%(ext)s`);
/// collections use their folder name, which is the playlist title
fn title_for(files: &[PathBuf], request: &DownloadRequest) -> String {
    let first = match files.first() {
        Some(first) => first,
        None => return request.url.clone(),
    };

    let name = if request.kind.is_collection() {
        first.parent().and_then(|p| p.file_name())
    } else {
        first.file_stem()
    };

    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| request.url.clone())
}

/// `title.f137.mp4` style per-format downloads that get merged later
fn is_format_fragment(path: &str) -> bool {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() >= 3
        && parts[1..parts.len() - 1].iter().any(|p| {
            p.len() > 1 && p.starts_with('f') && p[1..].chars().all(|c| c.is_ascii_digit())
        })
}
