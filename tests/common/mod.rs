//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};
use tubeloader::database::DatabaseManager;
use tubeloader::downloader::{
    DownloadBackend, DownloadOutcome, DownloadProgress, DownloadRequest, ProgressSink,
};
use tubeloader::extractor::LinkKind;
use tubeloader::queue::{Job, QueueEvent, QueueManager};
use tubeloader::utils::{AppSettings, DownloadError, MediaMode};

/// Backend whose jobs only finish when the test releases them.
///
/// Every call records its request, reports one progress sample, then waits
/// for a permit. URLs matching a registered failure pattern fail with that
/// error; everything else completes.
pub struct GatedBackend {
    gate: Semaphore,
    running: AtomicUsize,
    max_running: AtomicUsize,
    requests: Mutex<Vec<DownloadRequest>>,
    failures: Mutex<Vec<(String, DownloadError)>>,
    skips: Mutex<Vec<String>>,
}

impl GatedBackend {
    /// Jobs block until [`GatedBackend::release`]
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::with_permits(0))
    }

    /// Jobs finish right away
    pub fn open() -> Arc<Self> {
        Arc::new(Self::with_permits(Semaphore::MAX_PERMITS / 2))
    }

    fn with_permits(permits: usize) -> Self {
        Self {
            gate: Semaphore::new(permits),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            skips: Mutex::new(Vec::new()),
        }
    }

    /// Let `n` more jobs finish
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn fail_with(&self, pattern: &str, error: DownloadError) {
        self.failures
            .lock()
            .unwrap()
            .push((pattern.to_string(), error));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn skip(&self, pattern: &str) {
        self.skips.lock().unwrap().push(pattern.to_string());
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn started_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Poll until `n` jobs have started
    pub async fn wait_started(&self, n: usize) {
        for _ in 0..500 {
            if self.requests.lock().unwrap().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} started jobs, saw {}",
            n,
            self.requests.lock().unwrap().len()
        );
    }
}

#[async_trait]
impl DownloadBackend for GatedBackend {
    fn id(&self) -> &'static str {
        "gated"
    }

    async fn run(
        &self,
        request: &DownloadRequest,
        progress: ProgressSink,
    ) -> Result<DownloadOutcome, DownloadError> {
        self.requests.lock().unwrap().push(request.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _ = progress.send(DownloadProgress::new(1, Some(2)));

        let permit = self.gate.acquire().await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        match permit {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(DownloadError::Network("gate closed".to_string())),
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| request.url.contains(pattern.as_str()))
            .map(|(_, err)| err.clone());
        if let Some(err) = failure {
            return Err(err);
        }

        let title = title_for(&request.url);
        let output_path = request.output_folder.join(format!("{}.mp4", title));
        let skipped = self
            .skips
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| request.url.contains(pattern.as_str()));
        if skipped {
            return Ok(DownloadOutcome::Skipped {
                title,
                output_path,
                reason: "File already exists".to_string(),
            });
        }

        Ok(DownloadOutcome::Completed {
            title,
            output_path: output_path.clone(),
            files: vec![output_path],
        })
    }
}

/// Last `=`/`/`-separated piece of the URL, e.g. the video id
pub fn title_for(url: &str) -> String {
    url.rsplit(|c| c == '=' || c == '/')
        .next()
        .unwrap_or(url)
        .to_string()
}

pub fn video_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

pub fn video_job(id: &str) -> Job {
    Job::new(video_url(id), LinkKind::Video, MediaMode::Video, None, None)
}

pub fn settings(output: &Path, workers: usize) -> AppSettings {
    AppSettings {
        output_folder: output.to_path_buf(),
        parallel_workers: workers,
        ..AppSettings::default()
    }
}

pub fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("tubeloader.db")
}

pub struct Fixture {
    pub dir: TempDir,
    pub queue: QueueManager,
    pub events: mpsc::UnboundedReceiver<QueueEvent>,
    pub db: Arc<DatabaseManager>,
    pub backend: Arc<GatedBackend>,
}

impl Fixture {
    pub async fn new(workers: usize, backend: Arc<GatedBackend>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::in_dir(dir, workers, backend).await
    }

    /// A fresh queue over an existing store, as after a restart
    pub async fn in_dir(dir: TempDir, workers: usize, backend: Arc<GatedBackend>) -> Self {
        let db = Arc::new(DatabaseManager::open(&db_path(&dir)).await.unwrap());
        let (queue, events) = QueueManager::new(
            settings(dir.path(), workers),
            backend.clone(),
            Arc::clone(&db),
        );
        Self {
            dir,
            queue,
            events,
            db,
            backend,
        }
    }

    /// Everything emitted so far
    pub fn drain_events(&mut self) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.queue.wait_idle())
            .await
            .expect("queue did not go idle");
    }
}
