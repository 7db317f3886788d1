//! Database module

pub mod operations;
pub mod schema;

// Re-export for convenience
pub use operations::{DatabaseManager, FailedEntry, HistoryRecord, HISTORY_DISPLAY_LIMIT};
pub use schema::initialize_database;
