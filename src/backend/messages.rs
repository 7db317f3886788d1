use crate::extractor::ClassifiedUrl;
use crate::queue::QueueEvent;
use crate::utils::config::{AppSettings, MediaMode};

/// Commands sent from the UI to the backend
#[derive(Debug, Clone)]
pub enum BackendCommand {
    /// Queue already-detected links
    Submit {
        links: Vec<ClassifiedUrl>,
        mode: MediaMode,
        quality: Option<String>,
        format: Option<String>,
    },
    /// Detect links in pasted text and queue them
    SubmitText {
        text: String,
        mode: MediaMode,
        quality: Option<String>,
        format: Option<String>,
    },
    Pause,
    Resume,
    /// Cancel a pending job by id
    Cancel(String),
    /// Validate, persist and apply new settings
    UpdateSettings(AppSettings),
    /// Re-queue the failed store
    RetryFailed,
    /// Ask for a [`BackendEvent::Idle`] once nothing is running or startable
    WaitIdle,
    // System
    Shutdown,
}

/// Events sent from the backend to the UI
#[derive(Debug, Clone)]
pub enum BackendEvent {
    Queue(QueueEvent),
    LinksDetected(Vec<ClassifiedUrl>),
    SettingsSaved(AppSettings),
    /// Answer to [`BackendCommand::WaitIdle`]
    Idle {
        pending: usize,
    },
    // System
    Error(String),
}
