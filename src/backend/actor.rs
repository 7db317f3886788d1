use super::messages::{BackendCommand, BackendEvent};
use crate::database::DatabaseManager;
use crate::downloader::{DownloadBackend, YtDlpEngine};
use crate::extractor::{extract, ClassifiedUrl};
use crate::queue::{QueueEvent, QueueManager};
use crate::utils::config::{AppSettings, MediaMode};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Single owner of the queue, the store and the settings file.
///
/// The UI talks to it only through [`BackendCommand`]s and receives
/// [`BackendEvent`]s, in order, on one channel.
pub struct BackendActor {
    receiver: mpsc::Receiver<BackendCommand>,
    sender: mpsc::Sender<BackendEvent>,

    queue: QueueManager,
    queue_events: Option<mpsc::UnboundedReceiver<QueueEvent>>,
    settings: AppSettings,
    settings_path: PathBuf,
}

impl BackendActor {
    /// Backend driving the yt-dlp found on this machine
    pub async fn new(
        settings: AppSettings,
        settings_path: PathBuf,
        db_path: &Path,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Result<Self> {
        let engine = YtDlpEngine::new().context("Cannot download without yt-dlp")?;
        info!("Using yt-dlp at {:?}", engine.ytdlp_path());
        Self::with_backend(settings, settings_path, db_path, Arc::new(engine), receiver, sender)
            .await
    }

    /// Backend with an explicit download backend
    pub async fn with_backend(
        settings: AppSettings,
        settings_path: PathBuf,
        db_path: &Path,
        engine: Arc<dyn DownloadBackend>,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Result<Self> {
        let db = DatabaseManager::open(db_path)
            .await
            .with_context(|| format!("Failed to open download store at {}", db_path.display()))?;

        let (queue, queue_events) = QueueManager::new(settings.clone(), engine, Arc::new(db));

        Ok(Self {
            receiver,
            sender,
            queue,
            queue_events: Some(queue_events),
            settings,
            settings_path,
        })
    }

    pub async fn run(mut self) {
        info!("BackendActor started");

        // Queue events are forwarded as they happen
        let forwarder = self.queue_events.take().map(|mut events| {
            let sender = self.sender.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if sender.send(BackendEvent::Queue(event)).await.is_err() {
                        break;
                    }
                }
            })
        });

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                BackendCommand::Submit {
                    links,
                    mode,
                    quality,
                    format,
                } => {
                    self.handle_submit(&links, mode, quality, format).await;
                }
                BackendCommand::SubmitText {
                    text,
                    mode,
                    quality,
                    format,
                } => {
                    let links = extract(&text);
                    let _ = self
                        .sender
                        .send(BackendEvent::LinksDetected(links.clone()))
                        .await;
                    self.handle_submit(&links, mode, quality, format).await;
                }
                BackendCommand::Pause => self.queue.pause().await,
                BackendCommand::Resume => self.queue.resume().await,
                BackendCommand::Cancel(id) => {
                    if let Err(e) = self.queue.cancel(&id).await {
                        self.send_error(e.to_string()).await;
                    }
                }
                BackendCommand::UpdateSettings(settings) => {
                    self.handle_update_settings(settings).await;
                }
                BackendCommand::RetryFailed => match self.queue.retry_failed().await {
                    Ok(0) => {}
                    Ok(n) => info!("Re-queued {} downloads that failed last time", n),
                    Err(e) => {
                        error!("Failed to read failed downloads: {}", e);
                        self.send_error(format!("Failed to read failed downloads: {}", e))
                            .await;
                    }
                },
                BackendCommand::WaitIdle => self.spawn_idle_watch(),
                BackendCommand::Shutdown => {
                    info!("BackendActor shutting down");
                    // Let running downloads finish, start nothing new
                    self.queue.pause().await;
                    self.queue.wait_idle().await;
                    break;
                }
            }
        }

        // The forwarder ends once the last queue handle is gone
        drop(self.queue);
        if let Some(forwarder) = forwarder {
            let _ = forwarder.await;
        }
        info!("BackendActor stopped");
    }

    async fn handle_submit(
        &self,
        links: &[ClassifiedUrl],
        mode: MediaMode,
        quality: Option<String>,
        format: Option<String>,
    ) {
        if links.is_empty() {
            warn!("No YouTube links to queue");
            return;
        }
        let ids = self
            .queue
            .submit_links(links, mode, quality.as_deref(), format.as_deref())
            .await;
        info!("Queued {} jobs", ids.len());
    }

    async fn handle_update_settings(&mut self, settings: AppSettings) {
        if let Err(e) = settings.validate() {
            self.send_error(e.to_string()).await;
            return;
        }
        let settings = settings.normalized();

        if let Err(e) = settings.save(&self.settings_path).await {
            error!("Failed to save settings: {:#}", e);
            self.send_error(format!("Failed to save settings: {:#}", e))
                .await;
            return;
        }

        self.queue.update_settings(settings.clone()).await;
        self.settings = settings.clone();
        let _ = self.sender.send(BackendEvent::SettingsSaved(settings)).await;
    }

    fn spawn_idle_watch(&self) {
        let queue = self.queue.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            queue.wait_idle().await;
            let pending = queue.pending_count().await;
            let _ = sender.send(BackendEvent::Idle { pending }).await;
        });
    }

    async fn send_error(&self, message: String) {
        let _ = self.sender.send(BackendEvent::Error(message)).await;
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }
}
