//! Events that describe changes in the download queue state

use crate::downloader::DownloadProgress;
use crate::queue::job::Job;
use crate::utils::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// A new job was added to the queue
    JobQueued {
        job: Job,
        timestamp: DateTime<Utc>,
    },
    /// A job took a download slot
    JobStarted {
        job_id: String,
        url: String,
        timestamp: DateTime<Utc>,
    },
    JobProgress {
        job_id: String,
        progress: DownloadProgress,
    },
    /// A job completed successfully
    JobCompleted {
        job_id: String,
        url: String,
        title: String,
        output_path: PathBuf,
        timestamp: DateTime<Utc>,
    },
    /// Nothing to download, the files were already there
    JobSkipped {
        job_id: String,
        url: String,
        title: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A job failed
    JobFailed {
        job_id: String,
        url: String,
        kind: FailureKind,
        error: String,
        /// Stored for retry on the next launch
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// A pending job was cancelled
    JobRemoved {
        job_id: String,
        timestamp: DateTime<Utc>,
    },
    QueuePaused {
        timestamp: DateTime<Utc>,
    },
    QueueResumed {
        timestamp: DateTime<Utc>,
    },
    WorkersChanged {
        workers: usize,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// The job this event is about, if any
    pub fn job_id(&self) -> Option<&str> {
        match self {
            QueueEvent::JobQueued { job, .. } => Some(&job.id),
            QueueEvent::JobStarted { job_id, .. }
            | QueueEvent::JobProgress { job_id, .. }
            | QueueEvent::JobCompleted { job_id, .. }
            | QueueEvent::JobSkipped { job_id, .. }
            | QueueEvent::JobFailed { job_id, .. }
            | QueueEvent::JobRemoved { job_id, .. } => Some(job_id),
            QueueEvent::QueuePaused { .. }
            | QueueEvent::QueueResumed { .. }
            | QueueEvent::WorkersChanged { .. } => None,
        }
    }

    /// Whether the job named by this event has left the queue
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueEvent::JobCompleted { .. }
                | QueueEvent::JobSkipped { .. }
                | QueueEvent::JobFailed { .. }
                | QueueEvent::JobRemoved { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_and_terminal_flags() {
        let event = QueueEvent::JobFailed {
            job_id: "j1".to_string(),
            url: "https://youtu.be/a".to_string(),
            kind: FailureKind::Network,
            error: "timed out".to_string(),
            will_retry: true,
            timestamp: Utc::now(),
        };
        assert_eq!(event.job_id(), Some("j1"));
        assert!(event.is_terminal());

        let paused = QueueEvent::QueuePaused {
            timestamp: Utc::now(),
        };
        assert_eq!(paused.job_id(), None);
        assert!(!paused.is_terminal());
    }

    #[test]
    fn events_serialize_to_json() {
        let event = QueueEvent::JobStarted {
            job_id: "j2".to_string(),
            url: "https://youtu.be/b".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: QueueEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
