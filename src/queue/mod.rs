//! Bounded download queue

pub mod events;
pub mod job;
pub mod manager;

pub use events::QueueEvent;
pub use job::{Job, JobStatus};
pub use manager::QueueManager;
