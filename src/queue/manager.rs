//! Download queue manager with concurrent download support

use crate::database::{DatabaseManager, FailedEntry, HistoryRecord};
use crate::downloader::{DownloadBackend, DownloadOutcome, DownloadProgress, DownloadRequest};
use crate::extractor::{classify, ClassifiedUrl};
use crate::queue::events::QueueEvent;
use crate::queue::job::{Job, JobStatus};
use crate::utils::config::{clamp_workers, AppSettings, MediaMode};
use crate::utils::error::{DownloadError, TubeloaderError};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, error, info, warn};

/// FIFO of pending jobs feeding a bounded number of download slots.
///
/// Cloning is cheap and every clone drives the same queue. Events go to the
/// receiver returned by [`QueueManager::new`].
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<QueueState>,
    engine: Arc<dyn DownloadBackend>,
    db: Arc<DatabaseManager>,
    events: mpsc::UnboundedSender<QueueEvent>,
    idle: Notify,
}

/// Everything guarded by the queue lock
struct QueueState {
    pending: VecDeque<String>,
    jobs: HashMap<String, Job>,
    /// URL -> id of the pending or active job downloading it
    live_urls: HashMap<String, String>,
    active: usize,
    paused: bool,
    settings: AppSettings,
}

impl QueueState {
    /// Nothing running and nothing that could start
    fn is_idle(&self) -> bool {
        self.active == 0 && (self.paused || self.pending.is_empty())
    }
}

impl Inner {
    fn emit(&self, event: QueueEvent) {
        // A closed receiver only means nobody is watching
        let _ = self.events.send(event);
    }
}

impl QueueManager {
    /// Create new queue manager and the receiving end of its event stream
    pub fn new(
        settings: AppSettings,
        engine: Arc<dyn DownloadBackend>,
        db: Arc<DatabaseManager>,
    ) -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let settings = AppSettings {
            parallel_workers: clamp_workers(settings.parallel_workers),
            ..settings
        };
        info!(
            "Queue ready with {} download slots ({} backend)",
            settings.parallel_workers,
            engine.id()
        );

        let manager = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    jobs: HashMap::new(),
                    live_urls: HashMap::new(),
                    active: 0,
                    paused: false,
                    settings,
                }),
                engine,
                db,
                events,
                idle: Notify::new(),
            }),
        };
        (manager, events_rx)
    }

    /// Add a job to the back of the queue and return its id.
    ///
    /// A URL that is already pending or downloading is not queued again; the
    /// id of the live job is returned instead.
    pub async fn submit(&self, job: Job) -> String {
        let mut state = self.inner.state.lock().await;
        if let Some(existing) = state.live_urls.get(&job.url) {
            debug!("{} is already queued as job {}", job.url, existing);
            return existing.clone();
        }
        let id = enqueue(&self.inner, &mut state, job);
        dispatch(&self.inner, &mut state);
        id
    }

    /// Queue one job per detected link, in order. Links already in the
    /// queue are skipped; returns the ids of the new jobs.
    pub async fn submit_links(
        &self,
        links: &[ClassifiedUrl],
        mode: MediaMode,
        quality: Option<&str>,
        format: Option<&str>,
    ) -> Vec<String> {
        let mut state = self.inner.state.lock().await;
        let mut ids = Vec::with_capacity(links.len());
        for link in links {
            if state.live_urls.contains_key(&link.url) {
                debug!("{} is already queued, skipping", link.url);
                continue;
            }
            let job = Job::from_link(link, mode, quality, format);
            ids.push(enqueue(&self.inner, &mut state, job));
        }
        dispatch(&self.inner, &mut state);
        ids
    }

    /// Stop starting new jobs. Jobs already downloading run to completion.
    pub async fn pause(&self) {
        let mut state = self.inner.state.lock().await;
        if !state.paused {
            state.paused = true;
            info!("Queue paused ({} active, {} pending)", state.active, state.pending.len());
            self.inner.emit(QueueEvent::QueuePaused {
                timestamp: Utc::now(),
            });
        }
        dispatch(&self.inner, &mut state);
    }

    /// Reopen dispatch; pending jobs keep their order
    pub async fn resume(&self) {
        let mut state = self.inner.state.lock().await;
        if state.paused {
            state.paused = false;
            info!("Queue resumed");
            self.inner.emit(QueueEvent::QueueResumed {
                timestamp: Utc::now(),
            });
        }
        dispatch(&self.inner, &mut state);
    }

    pub async fn is_paused(&self) -> bool {
        self.inner.state.lock().await.paused
    }

    /// Remove a pending job. Active jobs cannot be cancelled.
    pub async fn cancel(&self, job_id: &str) -> Result<(), TubeloaderError> {
        let mut state = self.inner.state.lock().await;
        match state.jobs.get(job_id).map(|job| job.status) {
            None => return Err(TubeloaderError::JobNotFound(job_id.to_string())),
            Some(JobStatus::Pending) => {}
            Some(_) => return Err(TubeloaderError::JobActive(job_id.to_string())),
        }

        if let Some(job) = state.jobs.remove(job_id) {
            state.live_urls.remove(&job.url);
        }
        state.pending.retain(|id| id != job_id);
        info!("Cancelled pending job {}", job_id);
        self.inner.emit(QueueEvent::JobRemoved {
            job_id: job_id.to_string(),
            timestamp: Utc::now(),
        });
        dispatch(&self.inner, &mut state);
        Ok(())
    }

    /// Change the number of download slots, clamped to 1..=5.
    ///
    /// Lowering the count never stops a running job; the extra slots drain
    /// as their jobs finish.
    pub async fn set_parallel_workers(&self, workers: usize) -> usize {
        let workers = clamp_workers(workers);
        let mut state = self.inner.state.lock().await;
        if state.settings.parallel_workers != workers {
            state.settings.parallel_workers = workers;
            info!("Download slots set to {}", workers);
            self.inner.emit(QueueEvent::WorkersChanged {
                workers,
                timestamp: Utc::now(),
            });
        }
        dispatch(&self.inner, &mut state);
        workers
    }

    /// Replace the settings used for jobs dispatched from now on
    pub async fn update_settings(&self, settings: AppSettings) {
        let settings = settings.normalized();
        let workers = settings.parallel_workers;
        let mut state = self.inner.state.lock().await;
        let workers_changed = state.settings.parallel_workers != workers;
        state.settings = settings;
        if workers_changed {
            self.inner.emit(QueueEvent::WorkersChanged {
                workers,
                timestamp: Utc::now(),
            });
        }
        debug!("Queue settings updated");
        dispatch(&self.inner, &mut state);
    }

    pub async fn settings(&self) -> AppSettings {
        self.inner.state.lock().await.settings.clone()
    }

    /// Live jobs: active ones first (oldest first), then pending in queue order
    pub async fn snapshot(&self) -> Vec<Job> {
        let state = self.inner.state.lock().await;
        let mut active: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Active)
            .cloned()
            .collect();
        active.sort_by_key(|job| job.added_at);

        active
            .into_iter()
            .chain(state.pending.iter().filter_map(|id| state.jobs.get(id).cloned()))
            .collect()
    }

    /// A live job by id. Finished jobs are no longer in the queue.
    pub async fn job(&self, job_id: &str) -> Option<Job> {
        self.inner.state.lock().await.jobs.get(job_id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.inner.state.lock().await.active
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// Wait until no job is active and none can start (queue empty or paused)
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.state.lock().await.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Re-queue every entry of the failed store.
    ///
    /// Entries stay in the store until a retry succeeds. URLs already in the
    /// live queue are not queued twice.
    pub async fn retry_failed(&self) -> Result<usize, TubeloaderError> {
        let entries = self.inner.db.failed_entries().await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut state = self.inner.state.lock().await;
        let mut queued = 0;

        for entry in entries {
            if state.live_urls.contains_key(&entry.url) {
                debug!("{} is already queued, not retrying", entry.url);
                continue;
            }
            let kind = classify(&entry.url).map(|link| link.kind).unwrap_or(entry.kind);
            let job = Job::new(entry.url, kind, entry.mode, entry.quality, entry.format);
            enqueue(&self.inner, &mut state, job);
            queued += 1;
        }

        info!("Retrying {} failed downloads", queued);
        dispatch(&self.inner, &mut state);
        Ok(queued)
    }
}

fn enqueue(inner: &Inner, state: &mut QueueState, mut job: Job) -> String {
    job.status = JobStatus::Pending;
    job.progress = 0.0;
    let id = job.id.clone();

    debug!("Queued job {} for {}", id, job.url);
    state.live_urls.insert(job.url.clone(), id.clone());
    state.pending.push_back(id.clone());
    state.jobs.insert(id.clone(), job.clone());
    inner.emit(QueueEvent::JobQueued {
        job,
        timestamp: Utc::now(),
    });
    id
}

/// Start pending jobs while the queue is open and slots are free.
/// Must be called with the queue lock held.
fn dispatch(inner: &Arc<Inner>, state: &mut QueueState) {
    while !state.paused && state.active < state.settings.parallel_workers {
        let id = match state.pending.pop_front() {
            Some(id) => id,
            None => break,
        };
        let job = match state.jobs.get_mut(&id) {
            Some(job) => job,
            None => continue,
        };
        job.status = JobStatus::Active;
        let job = job.clone();
        state.active += 1;

        let request = job.request(&state.settings);
        info!(
            "Starting job {} ({} {}) [{}/{}]",
            job.id,
            job.kind,
            job.url,
            state.active,
            state.settings.parallel_workers
        );
        inner.emit(QueueEvent::JobStarted {
            job_id: job.id.clone(),
            url: job.url.clone(),
            timestamp: Utc::now(),
        });

        tokio::spawn(run_job(Arc::clone(inner), job, request));
    }

    if state.is_idle() {
        inner.idle.notify_waiters();
    }
}

/// One download slot: run the job, then hand the slot back
async fn run_job(inner: Arc<Inner>, job: Job, request: DownloadRequest) {
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<DownloadProgress>();

    let forwarder = {
        let inner = Arc::clone(&inner);
        let job_id = job.id.clone();
        tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                let mut state = inner.state.lock().await;
                if let Some(job) = state.jobs.get_mut(&job_id) {
                    job.progress = progress.fraction;
                    job.speed = progress.speed;
                    job.eta = progress.eta.map(|eta| eta.as_secs());
                }
                inner.emit(QueueEvent::JobProgress {
                    job_id: job_id.clone(),
                    progress,
                });
            }
        })
    };

    // Separate task so a panicking backend still frees the slot
    let engine = Arc::clone(&inner.engine);
    let result = match tokio::spawn(async move { engine.run(&request, progress_tx).await }).await
    {
        Ok(result) => result,
        Err(e) => {
            error!("Download task for job {} ended abnormally: {}", job.id, e);
            Err(DownloadError::Network(format!("download task ended abnormally: {}", e)))
        }
    };

    if let Err(e) = forwarder.await {
        warn!("Progress forwarding for job {} ended abnormally: {}", job.id, e);
    }

    finish(&inner, job, result).await;
}

/// Persist the result, report it, and free the slot
async fn finish(inner: &Arc<Inner>, job: Job, result: Result<DownloadOutcome, DownloadError>) {
    let will_retry = record_result(&inner.db, &job, &result).await;

    let mut state = inner.state.lock().await;
    state.jobs.remove(&job.id);
    state.live_urls.remove(&job.url);
    state.active = state.active.saturating_sub(1);
    let timestamp = Utc::now();

    match result {
        Ok(DownloadOutcome::Completed {
            title, output_path, ..
        }) => {
            info!("Job {} completed: {} -> {:?}", job.id, title, output_path);
            inner.emit(QueueEvent::JobCompleted {
                job_id: job.id,
                url: job.url,
                title,
                output_path,
                timestamp,
            });
        }
        Ok(DownloadOutcome::Skipped { title, reason, .. }) => {
            info!("Job {} skipped: {} ({})", job.id, title, reason);
            inner.emit(QueueEvent::JobSkipped {
                job_id: job.id,
                url: job.url,
                title,
                reason,
                timestamp,
            });
        }
        Err(err) => {
            error!("Job {} failed ({}): {}", job.id, err.kind().as_str(), err);
            inner.emit(QueueEvent::JobFailed {
                job_id: job.id,
                url: job.url,
                kind: err.kind(),
                error: err.message().to_string(),
                will_retry,
                timestamp,
            });
        }
    }

    dispatch(inner, &mut state);
}

/// Update history and the failed store. Store errors are logged and never
/// reach the pool. Returns whether the job was stored for retry.
async fn record_result(
    db: &DatabaseManager,
    job: &Job,
    result: &Result<DownloadOutcome, DownloadError>,
) -> bool {
    match result {
        Ok(outcome) => {
            if let DownloadOutcome::Completed {
                title, output_path, ..
            } = outcome
            {
                let record = HistoryRecord::new(
                    job.url.clone(),
                    title.clone(),
                    job.mode,
                    job.quality.clone(),
                    output_path.clone(),
                );
                if let Err(e) = db.append_history(&record).await {
                    error!("Failed to record history for {}: {}", job.url, e);
                }
            }
            // Only a success in the stored mode settles the retry
            match db.remove_failed_for_mode(&job.url, job.mode).await {
                Ok(true) => info!("{} succeeded, removed from failed downloads", job.url),
                Ok(false) => {}
                Err(e) => error!("Failed to clear failed entry for {}: {}", job.url, e),
            }
            false
        }
        Err(err) if err.is_retryable() => {
            let entry = FailedEntry::new(
                job.url.clone(),
                job.kind,
                job.mode,
                job.quality.clone(),
                job.format.clone(),
                err.message(),
            );
            match db.add_failed(&entry).await {
                Ok(attempts) => {
                    info!("Stored {} for retry (attempt {})", job.url, attempts);
                    true
                }
                Err(e) => {
                    error!("Failed to store {} for retry: {}", job.url, e);
                    false
                }
            }
        }
        Err(_) => {
            // A retry would fail the same way
            if let Err(e) = db.remove_failed(&job.url).await {
                error!("Failed to clear failed entry for {}: {}", job.url, e);
            }
            false
        }
    }
}
