//! Worker pool scenarios: slot limits, pause/resume, FIFO, cancellation

mod common;

use common::{video_job, video_url, Fixture, GatedBackend};
use std::path::PathBuf;
use std::time::Duration;
use tubeloader::queue::{JobStatus, QueueEvent};
use tubeloader::utils::TubeloaderError;

#[tokio::test]
async fn two_workers_five_jobs() {
    let mut fx = Fixture::new(2, GatedBackend::gated()).await;

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(fx.queue.submit(video_job(&format!("job{}", i))).await);
    }

    fx.backend.wait_started(2).await;
    assert_eq!(fx.queue.active_count().await, 2);
    assert_eq!(fx.queue.pending_count().await, 3);

    let snapshot = fx.queue.snapshot().await;
    let statuses: Vec<JobStatus> = snapshot.iter().map(|j| j.status).collect();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Active,
            JobStatus::Active,
            JobStatus::Pending,
            JobStatus::Pending,
            JobStatus::Pending
        ]
    );
    assert_eq!(snapshot[2].id, ids[2]);

    // One slot frees, exactly one more job starts
    fx.backend.release(1);
    fx.backend.wait_started(3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.backend.started_urls().len(), 3);
    assert_eq!(fx.queue.active_count().await, 2);
    assert_eq!(fx.queue.pending_count().await, 2);

    fx.backend.release(10);
    fx.wait_idle().await;

    assert_eq!(fx.backend.max_running(), 2);
    let expected: Vec<String> = (0..5).map(|i| video_url(&format!("job{}", i))).collect();
    assert_eq!(fx.backend.started_urls(), expected);

    let completed = fx
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, QueueEvent::JobCompleted { .. }))
        .count();
    assert_eq!(completed, 5);
    assert!(fx.queue.snapshot().await.is_empty());
}

#[tokio::test]
async fn paused_queue_holds_submissions_until_resume() {
    let fx = Fixture::new(2, GatedBackend::gated()).await;

    fx.queue.pause().await;
    assert!(fx.queue.is_paused().await);
    for id in ["a", "b", "c"] {
        fx.queue.submit(video_job(id)).await;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.backend.started_urls().is_empty());
    assert_eq!(fx.queue.active_count().await, 0);
    assert_eq!(fx.queue.pending_count().await, 3);
    assert!(fx
        .queue
        .snapshot()
        .await
        .iter()
        .all(|j| j.status == JobStatus::Pending));

    fx.queue.resume().await;
    fx.backend.wait_started(2).await;
    assert_eq!(
        fx.backend.started_urls(),
        vec![video_url("a"), video_url("b")]
    );
    assert_eq!(fx.queue.pending_count().await, 1);

    fx.backend.release(3);
    fx.wait_idle().await;
    assert_eq!(
        fx.backend.started_urls(),
        vec![video_url("a"), video_url("b"), video_url("c")]
    );
}

#[tokio::test]
async fn pause_never_interrupts_active_jobs() {
    let mut fx = Fixture::new(1, GatedBackend::gated()).await;

    let running = fx.queue.submit(video_job("running")).await;
    fx.backend.wait_started(1).await;
    fx.queue.pause().await;
    let waiting = fx.queue.submit(video_job("waiting")).await;

    assert_eq!(
        fx.queue.job(&running).await.map(|j| j.status),
        Some(JobStatus::Active)
    );

    fx.backend.release(1);
    fx.wait_idle().await;

    let events = fx.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        QueueEvent::JobCompleted { job_id, .. } if job_id == &running
    )));
    // Still paused, so the second job never started
    assert_eq!(
        fx.queue.job(&waiting).await.map(|j| j.status),
        Some(JobStatus::Pending)
    );
    assert_eq!(fx.backend.started_urls().len(), 1);
}

#[tokio::test]
async fn cancel_only_touches_pending_jobs() {
    let mut fx = Fixture::new(1, GatedBackend::gated()).await;

    let active = fx.queue.submit(video_job("active")).await;
    let pending = fx.queue.submit(video_job("pending")).await;
    let after = fx.queue.submit(video_job("after")).await;
    fx.backend.wait_started(1).await;

    match fx.queue.cancel(&active).await {
        Err(TubeloaderError::JobActive(id)) => assert_eq!(id, active),
        other => panic!("unexpected {:?}", other),
    }
    fx.queue.cancel(&pending).await.unwrap();
    assert!(fx.queue.job(&pending).await.is_none());
    assert!(matches!(
        fx.queue.cancel(&pending).await,
        Err(TubeloaderError::JobNotFound(_))
    ));

    fx.backend.release(2);
    fx.wait_idle().await;

    assert_eq!(
        fx.backend.started_urls(),
        vec![video_url("active"), video_url("after")]
    );
    let events = fx.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        QueueEvent::JobRemoved { job_id, .. } if job_id == &pending
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        QueueEvent::JobCompleted { job_id, .. } if job_id == &after
    )));
}

#[tokio::test]
async fn raising_workers_starts_waiting_jobs() {
    let fx = Fixture::new(1, GatedBackend::gated()).await;
    for id in ["x", "y", "z"] {
        fx.queue.submit(video_job(id)).await;
    }
    fx.backend.wait_started(1).await;

    assert_eq!(fx.queue.set_parallel_workers(3).await, 3);
    fx.backend.wait_started(3).await;
    assert_eq!(fx.queue.active_count().await, 3);

    fx.backend.release(3);
    fx.wait_idle().await;
}

#[tokio::test]
async fn lowering_workers_drains_without_stopping_jobs() {
    let fx = Fixture::new(3, GatedBackend::gated()).await;
    for i in 0..5 {
        fx.queue.submit(video_job(&format!("d{}", i))).await;
    }
    fx.backend.wait_started(3).await;

    fx.queue.set_parallel_workers(1).await;
    assert_eq!(fx.queue.active_count().await, 3);

    // Two finish: still at or above the new limit, nothing new starts
    fx.backend.release(2);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fx.backend.started_urls().len(), 3);
    assert_eq!(fx.queue.active_count().await, 1);

    fx.backend.release(1);
    fx.backend.wait_started(4).await;
    assert_eq!(fx.queue.active_count().await, 1);

    fx.backend.release(10);
    fx.wait_idle().await;
}

#[tokio::test]
async fn settings_changes_apply_to_later_jobs() {
    let fx = Fixture::new(1, GatedBackend::gated()).await;
    fx.queue.submit(video_job("first")).await;
    fx.queue.submit(video_job("second")).await;
    fx.backend.wait_started(1).await;

    let elsewhere = fx.dir.path().join("elsewhere");
    let mut settings = fx.queue.settings().await;
    settings.output_folder = elsewhere.clone();
    settings.speed_limit_kbps = 500;
    fx.queue.update_settings(settings).await;

    fx.backend.release(2);
    fx.wait_idle().await;

    let requests = fx.backend.requests();
    assert_eq!(requests[0].output_folder, PathBuf::from(fx.dir.path()));
    assert_eq!(requests[0].speed_limit_kbps, 0);
    assert_eq!(requests[1].output_folder, elsewhere);
    assert_eq!(requests[1].speed_limit_kbps, 500);
}

#[tokio::test]
async fn progress_updates_reach_jobs_and_events() {
    let mut fx = Fixture::new(1, GatedBackend::gated()).await;
    let id = fx.queue.submit(video_job("progress")).await;
    fx.backend.wait_started(1).await;

    // The backend reports half done before blocking
    let mut progressed = false;
    for _ in 0..100 {
        if fx.queue.job(&id).await.map(|j| j.progress) == Some(0.5) {
            progressed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(progressed);

    fx.backend.release(1);
    fx.wait_idle().await;
    let events = fx.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        QueueEvent::JobProgress { job_id, progress } if job_id == &id && progress.fraction == 0.5
    )));
}
