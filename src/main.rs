//! Tubeloader - YouTube downloader built on yt-dlp
//!
//! Paste text, get every YouTube link in it downloaded through a small
//! bounded queue. Downloads that fail for network reasons are retried on the
//! next run.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tubeloader::backend::{BackendActor, BackendCommand, BackendEvent};
use tubeloader::database::{DatabaseManager, HISTORY_DISPLAY_LIMIT};
use tubeloader::extractor::{self, VideoExtractor};
use tubeloader::queue::QueueEvent;
use tubeloader::utils::clipboard::get_clipboard_content;
use tubeloader::utils::{database_path, settings_path, AppSettings, DuplicatePolicy, MediaMode};

#[derive(Parser)]
#[command(name = "tubeloader", version, about = "Download YouTube videos and audio with yt-dlp")]
struct Cli {
    /// Directory holding settings.json and the download store
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every YouTube link found in the given text
    Download(DownloadArgs),
    /// Show the YouTube links found in the given text
    Detect {
        text: Vec<String>,
        /// Also scan the clipboard
        #[arg(long)]
        clipboard: bool,
    },
    /// Show metadata for a link without downloading
    Info { url: String },
    /// Show completed downloads
    History {
        /// Show every entry instead of the most recent ones
        #[arg(long)]
        all: bool,
    },
    /// Show downloads waiting to be retried
    Failed {
        /// Forget the failed entry for this URL
        #[arg(long, value_name = "URL")]
        clear: Option<String>,
    },
    /// Show or change settings
    Settings(SettingsArgs),
    /// Open the download folder
    Open,
}

#[derive(Args)]
struct DownloadArgs {
    /// Links, or any text containing links
    text: Vec<String>,
    /// Also scan the clipboard
    #[arg(long)]
    clipboard: bool,
    /// Extract audio only
    #[arg(long)]
    audio: bool,
    /// best, 2160p, 1440p, 1080p, 720p, 480p, 360p or a yt-dlp format selector
    #[arg(long)]
    quality: Option<String>,
    /// Audio codec (mp3, aac, wav, flac, m4a, opus) or container (mp4, mkv, webm)
    #[arg(long)]
    format: Option<String>,
    /// Parallel downloads for this run (1-5)
    #[arg(long)]
    workers: Option<usize>,
    /// Speed cap in KiB/s for this run, 0 = unlimited
    #[arg(long, value_name = "KBPS")]
    limit: Option<u64>,
    /// Output folder for this run
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// What to do with files that already exist: ask, skip or replace
    #[arg(long)]
    duplicates: Option<DuplicatePolicy>,
    /// Do not retry downloads that failed last time
    #[arg(long)]
    no_retry: bool,
}

#[derive(Args)]
struct SettingsArgs {
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, value_name = "KBPS")]
    limit: Option<u64>,
    #[arg(long)]
    duplicates: Option<DuplicatePolicy>,
    /// Default mode: audio or video
    #[arg(long)]
    mode: Option<MediaMode>,
    #[arg(long)]
    quality: Option<String>,
    #[arg(long)]
    audio_format: Option<String>,
    #[arg(long)]
    video_format: Option<String>,
}

impl SettingsArgs {
    fn is_empty(&self) -> bool {
        self.output.is_none()
            && self.workers.is_none()
            && self.limit.is_none()
            && self.duplicates.is_none()
            && self.mode.is_none()
            && self.quality.is_none()
            && self.audio_format.is_none()
            && self.video_format.is_none()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays readable
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir.as_deref();
    match cli.command {
        Commands::Download(args) => download(args, data_dir).await,
        Commands::Detect { text, clipboard } => {
            detect(&text, clipboard);
            Ok(())
        }
        Commands::Info { url } => show_info(&url).await,
        Commands::History { all } => show_history(all, data_dir).await,
        Commands::Failed { clear } => show_failed(clear, data_dir).await,
        Commands::Settings(args) => settings(args, data_dir).await,
        Commands::Open => open_output(data_dir).await,
    }
}

/// Command-line text plus, optionally, the clipboard
fn gather_text(text: &[String], clipboard: bool) -> Result<String> {
    let mut combined = text.join("\n");
    if clipboard {
        let pasted = get_clipboard_content()?;
        debug!("Read {} bytes from the clipboard", pasted.len());
        combined.push('\n');
        combined.push_str(&pasted);
    }
    Ok(combined)
}

async fn download(args: DownloadArgs, data_dir: Option<&Path>) -> Result<()> {
    let settings_file = settings_path(data_dir);
    let mut settings = AppSettings::load(&settings_file).await?;

    // Per-run overrides are not persisted
    if let Some(workers) = args.workers {
        settings.parallel_workers = workers;
    }
    if let Some(limit) = args.limit {
        settings.speed_limit_kbps = limit;
    }
    if let Some(output) = args.output.clone() {
        settings.output_folder = output;
    }
    if let Some(policy) = args.duplicates {
        settings.duplicate_policy = policy;
    }
    let settings = settings.normalized();

    let mode = if args.audio {
        MediaMode::Audio
    } else {
        settings.default_mode
    };
    let text = gather_text(&args.text, args.clipboard)?;

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let actor = BackendActor::new(
        settings.clone(),
        settings_file,
        &database_path(data_dir),
        cmd_rx,
        event_tx,
    )
    .await?;
    let actor_handle = tokio::spawn(actor.run());

    println!("Saving to {}", settings.output_folder.display());
    if !args.no_retry {
        cmd_tx.send(BackendCommand::RetryFailed).await?;
    }
    cmd_tx
        .send(BackendCommand::SubmitText {
            text,
            mode,
            quality: args.quality,
            format: args.format,
        })
        .await?;
    cmd_tx.send(BackendCommand::WaitIdle).await?;

    let mut view = ProgressView::default();
    let mut interrupted = false;
    let mut shutting_down = false;

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(BackendEvent::Idle { pending }) => {
                    if pending > 0 {
                        println!("{} downloads not started", pending);
                    }
                    if !shutting_down {
                        shutting_down = true;
                        cmd_tx.send(BackendCommand::Shutdown).await?;
                    }
                }
                Some(event) => view.render(event),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("Interrupted: letting active downloads finish, not starting new ones");
                cmd_tx.send(BackendCommand::Pause).await?;
            }
        }
    }

    actor_handle.await.context("Backend task failed")?;
    view.print_summary();
    Ok(())
}

/// Line-oriented rendering of backend events
#[derive(Default)]
struct ProgressView {
    names: HashMap<String, String>,
    /// Last printed tenth of progress per job
    last_step: HashMap<String, u32>,
    completed: usize,
    skipped: usize,
    failed: usize,
    retrying: usize,
}

impl ProgressView {
    fn render(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::LinksDetected(links) => {
                if links.is_empty() {
                    println!("No YouTube links found");
                } else {
                    println!("Found {} links", links.len());
                }
            }
            BackendEvent::Queue(event) => self.render_queue(event),
            BackendEvent::SettingsSaved(_) | BackendEvent::Idle { .. } => {}
            BackendEvent::Error(message) => eprintln!("error: {}", message),
        }
    }

    fn render_queue(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::JobQueued { job, .. } => {
                println!("queued    {} [{}, {}]", job.url, job.kind, job.mode);
                self.names.insert(job.id, job.url);
            }
            QueueEvent::JobStarted { job_id, url, .. } => {
                println!("starting  {}", url);
                self.last_step.insert(job_id, 0);
            }
            QueueEvent::JobProgress { job_id, progress } => {
                let last = self.last_step.entry(job_id.clone()).or_insert(0);
                if crosses_step(last, progress.fraction) {
                    let name = self.names.get(&job_id).map(String::as_str).unwrap_or("");
                    println!("{}  {}", progress.status_text(), name);
                }
            }
            QueueEvent::JobCompleted {
                job_id,
                title,
                output_path,
                ..
            } => {
                self.completed += 1;
                self.forget(&job_id);
                println!("done      {} -> {}", title, output_path.display());
            }
            QueueEvent::JobSkipped {
                job_id,
                title,
                reason,
                ..
            } => {
                self.skipped += 1;
                self.forget(&job_id);
                println!("skipped   {} ({})", title, reason);
            }
            QueueEvent::JobFailed {
                job_id,
                url,
                kind,
                error,
                will_retry,
                ..
            } => {
                self.failed += 1;
                if will_retry {
                    self.retrying += 1;
                }
                self.forget(&job_id);
                println!(
                    "failed    {} [{}] {}{}",
                    url,
                    kind.as_str(),
                    error,
                    if will_retry { " (will retry next run)" } else { "" }
                );
            }
            QueueEvent::JobRemoved { job_id, .. } => {
                if let Some(name) = self.names.remove(&job_id) {
                    println!("removed   {}", name);
                }
            }
            QueueEvent::QueuePaused { .. } => println!("paused"),
            QueueEvent::QueueResumed { .. } => println!("resumed"),
            QueueEvent::WorkersChanged { workers, .. } => {
                println!("{} parallel downloads", workers)
            }
        }
    }

    fn forget(&mut self, job_id: &str) {
        self.names.remove(job_id);
        self.last_step.remove(job_id);
    }

    fn print_summary(&self) {
        if self.completed + self.skipped + self.failed == 0 {
            return;
        }
        println!(
            "{} completed, {} skipped, {} failed ({} kept for retry)",
            self.completed, self.skipped, self.failed, self.retrying
        );
    }
}

/// Whether `fraction` reached a new tenth since `last`. Collections restart
/// at 0 for every entry, so a drop starts the count over.
fn crosses_step(last: &mut u32, fraction: f64) -> bool {
    let step = (fraction * 10.0).floor() as u32;
    if step == *last {
        return false;
    }
    let crossed = step > *last;
    *last = step;
    crossed
}

fn detect(text: &[String], clipboard: bool) {
    let text = match gather_text(text, clipboard) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: {:#}", e);
            text.join("\n")
        }
    };
    let links = extractor::extract(&text);
    if links.is_empty() {
        println!("No YouTube links found");
    }
    for link in links {
        println!("{:<9} {}", link.kind.as_str(), link.url);
    }
}

async fn show_info(url: &str) -> Result<()> {
    let link = match extractor::classify(url) {
        Some(link) => link,
        None => bail!("Not a YouTube link: {}", url),
    };
    let probe = VideoExtractor::new()?;

    if link.kind.is_collection() {
        let entries = probe.extract_playlist(&link.url).await?;
        println!("{} ({} entries)", link.url, entries.len());
        for (i, entry) in entries.iter().enumerate() {
            println!(
                "{:>4}. {} [{}]",
                i + 1,
                entry.title,
                entry.display_duration()
            );
        }
        return Ok(());
    }

    let info = probe.extract_info(&link.url).await?;
    println!("Title:    {}", info.title);
    println!("Uploader: {}", info.display_uploader());
    println!("Duration: {}", info.display_duration());
    if let Some(views) = info.view_count {
        println!("Views:    {}", views);
    }
    println!("URL:      {}", info.page_url().unwrap_or(&link.url));
    Ok(())
}

async fn open_store(data_dir: Option<&Path>) -> Result<DatabaseManager> {
    let path = database_path(data_dir);
    DatabaseManager::open(&path)
        .await
        .with_context(|| format!("Failed to open download store at {}", path.display()))
}

async fn show_history(all: bool, data_dir: Option<&Path>) -> Result<()> {
    let db = open_store(data_dir).await?;
    let records = if all {
        db.all_history().await?
    } else {
        db.recent_history(HISTORY_DISPLAY_LIMIT).await?
    };

    if records.is_empty() {
        println!("No downloads yet");
    }
    for record in records {
        println!(
            "{}  {:<5}  {}  -> {}",
            record.completed_at.format("%Y-%m-%d %H:%M"),
            record.mode.as_str(),
            record.title,
            record.output_path.display()
        );
    }
    db.close().await;
    Ok(())
}

async fn show_failed(clear: Option<String>, data_dir: Option<&Path>) -> Result<()> {
    let db = open_store(data_dir).await?;

    if let Some(url) = clear {
        // Accept any link shape for the same video
        let url = extractor::classify(&url).map(|l| l.url).unwrap_or(url);
        if db.remove_failed(&url).await? {
            println!("Removed {}", url);
        } else {
            println!("{} is not in the failed list", url);
        }
        db.close().await;
        return Ok(());
    }

    let entries = db.failed_entries().await?;
    if entries.is_empty() {
        println!("No failed downloads");
    }
    for entry in entries {
        println!(
            "{}  x{}  {}  {}",
            entry.failed_at.format("%Y-%m-%d %H:%M"),
            entry.attempts,
            entry.url,
            entry.reason
        );
    }
    db.close().await;
    Ok(())
}

async fn settings(args: SettingsArgs, data_dir: Option<&Path>) -> Result<()> {
    let path = settings_path(data_dir);
    let mut settings = AppSettings::load(&path).await?;

    if !args.is_empty() {
        if let Some(output) = args.output {
            settings.output_folder = output;
        }
        if let Some(workers) = args.workers {
            settings.parallel_workers = workers;
        }
        if let Some(limit) = args.limit {
            settings.speed_limit_kbps = limit;
        }
        if let Some(policy) = args.duplicates {
            settings.duplicate_policy = policy;
        }
        if let Some(mode) = args.mode {
            settings.default_mode = mode;
        }
        if let Some(quality) = args.quality {
            settings.default_quality = quality;
        }
        if let Some(format) = args.audio_format {
            settings.audio_format = format.to_lowercase();
        }
        if let Some(format) = args.video_format {
            settings.video_format = format.to_lowercase();
        }

        settings.validate()?;
        settings = settings.normalized();
        settings.save(&path).await?;
        info!("Settings updated");
    }

    println!("{}", serde_json::to_string_pretty(&settings)?);
    println!("(stored in {})", path.display());
    Ok(())
}

async fn open_output(data_dir: Option<&Path>) -> Result<()> {
    let settings = AppSettings::load(&settings_path(data_dir)).await?;
    tokio::fs::create_dir_all(&settings.output_folder)
        .await
        .with_context(|| format!("Failed to create {}", settings.output_folder.display()))?;
    open::that(&settings.output_folder)
        .with_context(|| format!("Failed to open {}", settings.output_folder.display()))?;
    Ok(())
}
