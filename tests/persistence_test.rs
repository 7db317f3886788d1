//! History and failed-store bookkeeping across runs

mod common;

use common::{video_job, video_url, Fixture, GatedBackend};
use tubeloader::database::{HistoryRecord, HISTORY_DISPLAY_LIMIT};
use tubeloader::extractor::extract;
use tubeloader::queue::QueueEvent;
use tubeloader::utils::{DownloadError, FailureKind, MediaMode};

fn network_error() -> DownloadError {
    DownloadError::Network("Unable to download webpage: timed out".to_string())
}

#[tokio::test]
async fn network_failure_is_stored_once_and_retried_next_launch() {
    let backend = GatedBackend::open();
    backend.fail_with("flaky", network_error());
    let mut fx = Fixture::new(2, backend).await;
    let url = video_url("flaky");

    fx.queue.submit(video_job("flaky")).await;
    fx.wait_idle().await;

    let entries = fx.db.failed_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].url, url);
    assert_eq!(entries[0].attempts, 1);
    assert!(fx.drain_events().iter().any(|e| matches!(
        e,
        QueueEvent::JobFailed { kind: FailureKind::Network, will_retry: true, .. }
    )));

    // Failing again updates the same entry
    fx.queue.submit(video_job("flaky")).await;
    fx.wait_idle().await;
    let entries = fx.db.failed_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts, 2);

    // Next launch: same store, network is back
    let Fixture { dir, queue, db, .. } = fx;
    drop(queue);
    db.close().await;
    drop(db);

    let backend = GatedBackend::open();
    let mut fx = Fixture::in_dir(dir, 2, backend).await;
    assert_eq!(fx.queue.retry_failed().await.unwrap(), 1);
    fx.wait_idle().await;

    assert_eq!(fx.backend.started_urls(), vec![url.clone()]);
    assert!(fx.db.failed_entries().await.unwrap().is_empty());
    assert!(!fx.db.is_failed(&url).await.unwrap());

    let history = fx.db.all_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].url, url);
    assert_eq!(history[0].title, "flaky");
    assert!(fx
        .drain_events()
        .iter()
        .any(|e| matches!(e, QueueEvent::JobCompleted { .. })));
}

#[tokio::test]
async fn retry_keeps_entry_until_success() {
    let backend = GatedBackend::open();
    backend.fail_with("stubborn", network_error());
    let fx = Fixture::new(1, backend).await;

    fx.queue.submit(video_job("stubborn")).await;
    fx.wait_idle().await;

    // The retry fails too: still exactly one entry
    assert_eq!(fx.queue.retry_failed().await.unwrap(), 1);
    fx.wait_idle().await;
    let entries = fx.db.failed_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts, 2);

    fx.backend.clear_failures();
    assert_eq!(fx.queue.retry_failed().await.unwrap(), 1);
    fx.wait_idle().await;
    assert!(fx.db.failed_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn extraction_and_filesystem_failures_are_not_stored() {
    let backend = GatedBackend::open();
    backend.fail_with(
        "private",
        DownloadError::Extraction("Private video".to_string()),
    );
    backend.fail_with(
        "readonly",
        DownloadError::Filesystem("Read-only file system".to_string()),
    );
    let mut fx = Fixture::new(2, backend).await;

    fx.queue.submit(video_job("private")).await;
    fx.queue.submit(video_job("readonly")).await;
    fx.wait_idle().await;

    assert!(fx.db.failed_entries().await.unwrap().is_empty());
    let failures: Vec<(FailureKind, bool)> = fx
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            QueueEvent::JobFailed {
                kind, will_retry, ..
            } => Some((kind, will_retry)),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|(_, retry)| !retry));
    assert!(failures.contains(&(FailureKind::Extraction, false)));
    assert!(failures.contains(&(FailureKind::Filesystem, false)));
}

#[tokio::test]
async fn skipped_download_clears_failed_entry_without_history() {
    let backend = GatedBackend::open();
    backend.fail_with("again", network_error());
    let fx = Fixture::new(1, backend).await;

    fx.queue.submit(video_job("again")).await;
    fx.wait_idle().await;
    assert!(fx.db.is_failed(&video_url("again")).await.unwrap());

    fx.backend.clear_failures();
    fx.backend.skip("again");
    fx.queue.retry_failed().await.unwrap();
    fx.wait_idle().await;

    assert!(!fx.db.is_failed(&video_url("again")).await.unwrap());
    assert!(fx.db.all_history().await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_does_not_duplicate_live_jobs() {
    let backend = GatedBackend::open();
    backend.fail_with("dup", network_error());
    let fx = Fixture::new(1, backend).await;

    fx.queue.submit(video_job("dup")).await;
    fx.wait_idle().await;

    fx.queue.pause().await;
    fx.queue.submit(video_job("dup")).await;
    assert_eq!(fx.queue.retry_failed().await.unwrap(), 0);
    assert_eq!(fx.queue.pending_count().await, 1);
}

#[tokio::test]
async fn pasted_link_already_retrying_runs_once() {
    let backend = GatedBackend::open();
    backend.fail_with("again", network_error());
    let fx = Fixture::new(2, backend).await;
    fx.queue.submit(video_job("again")).await;
    fx.wait_idle().await;
    let Fixture { dir, queue, db, .. } = fx;
    drop(queue);
    db.close().await;
    drop(db);

    // Next launch: retry first, then the user pastes the same link
    let fx = Fixture::in_dir(dir, 2, GatedBackend::gated()).await;
    assert_eq!(fx.queue.retry_failed().await.unwrap(), 1);
    let links = extract(&format!("try again {}", video_url("again")));
    let ids = fx
        .queue
        .submit_links(&links, MediaMode::Video, None, None)
        .await;
    assert!(ids.is_empty());

    fx.backend.wait_started(1).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(fx.queue.active_count().await, 1);
    assert_eq!(fx.backend.started_urls(), vec![video_url("again")]);

    fx.backend.release(1);
    fx.wait_idle().await;
    assert!(fx.db.failed_entries().await.unwrap().is_empty());
    assert_eq!(fx.db.all_history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn success_in_other_mode_keeps_pending_retry() {
    let backend = GatedBackend::open();
    backend.fail_with("song", network_error());
    let fx = Fixture::new(1, backend).await;
    let url = video_url("song");

    let audio = tubeloader::queue::Job::new(
        url.clone(),
        tubeloader::extractor::LinkKind::Video,
        MediaMode::Audio,
        None,
        None,
    );
    fx.queue.submit(audio).await;
    fx.wait_idle().await;
    assert!(fx.db.is_failed(&url).await.unwrap());

    // The video of the same link downloads fine
    fx.backend.clear_failures();
    fx.queue.submit(video_job("song")).await;
    fx.wait_idle().await;
    let entries = fx.db.failed_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].mode, MediaMode::Audio);

    assert_eq!(fx.queue.retry_failed().await.unwrap(), 1);
    fx.wait_idle().await;
    assert!(fx.db.failed_entries().await.unwrap().is_empty());
    assert_eq!(fx.backend.requests()[2].mode, MediaMode::Audio);
}

#[tokio::test]
async fn retried_jobs_keep_their_choices() {
    let backend = GatedBackend::open();
    backend.fail_with("song", network_error());
    let fx = Fixture::new(1, backend).await;

    let job = tubeloader::queue::Job::new(
        video_url("song"),
        tubeloader::extractor::LinkKind::Video,
        MediaMode::Audio,
        None,
        Some("flac".to_string()),
    );
    fx.queue.submit(job).await;
    fx.wait_idle().await;

    fx.backend.clear_failures();
    fx.queue.retry_failed().await.unwrap();
    fx.wait_idle().await;

    let requests = fx.backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].mode, MediaMode::Audio);
    assert_eq!(requests[1].format, "flac");
}

#[tokio::test]
async fn history_display_is_trimmed_but_all_entries_persist() {
    let fx = Fixture::new(1, GatedBackend::open()).await;

    for i in 0..(HISTORY_DISPLAY_LIMIT + 10) {
        let record = HistoryRecord::new(
            video_url(&format!("h{}", i)),
            format!("Video {}", i),
            MediaMode::Video,
            None,
            fx.dir.path().join(format!("Video {}.mp4", i)),
        );
        fx.db.append_history(&record).await.unwrap();
    }

    let recent = fx.db.recent_history(HISTORY_DISPLAY_LIMIT).await.unwrap();
    assert_eq!(recent.len(), HISTORY_DISPLAY_LIMIT);
    assert_eq!(recent[0].title, format!("Video {}", HISTORY_DISPLAY_LIMIT + 9));

    let all = fx.db.all_history().await.unwrap();
    assert_eq!(all.len(), HISTORY_DISPLAY_LIMIT + 10);
    assert_eq!(all.last().unwrap().title, "Video 0");
}
