//! Database CRUD operations

use crate::database::schema::initialize_database;
use crate::extractor::LinkKind;
use crate::utils::config::MediaMode;
use crate::utils::error::TubeloaderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How many history entries the UI shows
pub const HISTORY_DISPLAY_LIMIT: usize = 50;

type DbResult<T> = Result<T, TubeloaderError>;

/// Database manager
pub struct DatabaseManager {
    pool: Pool<Sqlite>,
}

impl DatabaseManager {
    /// Create new database manager
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Open the store file, creating it on first use
    pub async fn open(path: &Path) -> DbResult<Self> {
        let pool = initialize_database(path).await?;
        Ok(Self::new(pool))
    }

    /// Record a completed download
    pub async fn append_history(&self, record: &HistoryRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO history (url, title, mode, quality, output_path, completed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.url)
        .bind(&record.title)
        .bind(record.mode.as_str())
        .bind(&record.quality)
        .bind(record.output_path.to_string_lossy().into_owned())
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;

        debug!("Saved history record: {}", record.url);
        Ok(())
    }

    /// Newest `limit` history entries, newest first
    pub async fn recent_history(&self, limit: usize) -> DbResult<Vec<HistoryRecord>> {
        let rows = sqlx::query("SELECT * FROM history ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(row_into_history_record).collect())
    }

    /// Every history entry, newest first
    pub async fn all_history(&self) -> DbResult<Vec<HistoryRecord>> {
        let rows = sqlx::query("SELECT * FROM history ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(row_into_history_record).collect())
    }

    /// Insert or refresh the failed entry for `entry.url`.
    ///
    /// Returns the attempt count after the update.
    pub async fn add_failed(&self, entry: &FailedEntry) -> DbResult<u32> {
        sqlx::query(
            r#"
            INSERT INTO failed_downloads (url, kind, mode, quality, format, reason, failed_at, attempts)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(url) DO UPDATE SET
                kind = excluded.kind,
                mode = excluded.mode,
                quality = excluded.quality,
                format = excluded.format,
                reason = excluded.reason,
                failed_at = excluded.failed_at,
                attempts = failed_downloads.attempts + 1
            "#,
        )
        .bind(&entry.url)
        .bind(entry.kind.as_str())
        .bind(entry.mode.as_str())
        .bind(&entry.quality)
        .bind(&entry.format)
        .bind(&entry.reason)
        .bind(entry.failed_at)
        .execute(&self.pool)
        .await?;

        let attempts: i64 = sqlx::query("SELECT attempts FROM failed_downloads WHERE url = ?")
            .bind(&entry.url)
            .fetch_one(&self.pool)
            .await?
            .get("attempts");

        debug!("Saved failed entry {} (attempt {})", entry.url, attempts);
        Ok(attempts.max(0) as u32)
    }

    /// Drop the failed entry for `url`; false when there was none
    pub async fn remove_failed(&self, url: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM failed_downloads WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop the failed entry for `url` only when it was stored for `mode`,
    /// so finishing a video download leaves a pending audio retry alone
    pub async fn remove_failed_for_mode(&self, url: &str, mode: MediaMode) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM failed_downloads WHERE url = ? AND mode = ?")
            .bind(url)
            .bind(mode.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All failed entries, oldest failure first
    pub async fn failed_entries(&self) -> DbResult<Vec<FailedEntry>> {
        let rows = sqlx::query("SELECT * FROM failed_downloads ORDER BY failed_at ASC, url ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(row_into_failed_entry).collect())
    }

    pub async fn is_failed(&self, url: &str) -> DbResult<bool> {
        let row = sqlx::query("SELECT 1 FROM failed_downloads WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// A completed download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Row id, `None` until stored
    pub id: Option<i64>,
    pub url: String,
    pub title: String,
    pub mode: MediaMode,
    pub quality: Option<String>,
    pub output_path: PathBuf,
    pub completed_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        mode: MediaMode,
        quality: Option<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: None,
            url: url.into(),
            title: title.into(),
            mode,
            quality,
            output_path: output_path.into(),
            completed_at: Utc::now(),
        }
    }
}

/// A download that failed with a retryable error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub url: String,
    pub kind: LinkKind,
    pub mode: MediaMode,
    pub quality: Option<String>,
    pub format: Option<String>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
    pub attempts: u32,
}

impl FailedEntry {
    pub fn new(
        url: impl Into<String>,
        kind: LinkKind,
        mode: MediaMode,
        quality: Option<String>,
        format: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            mode,
            quality,
            format,
            reason: reason.into(),
            failed_at: Utc::now(),
            attempts: 1,
        }
    }
}

fn parse_mode(raw: &str) -> MediaMode {
    raw.parse().unwrap_or_else(|_| {
        warn!("Unknown mode '{}' in store, using default", raw);
        MediaMode::default()
    })
}

fn parse_kind(raw: &str) -> LinkKind {
    match raw {
        "short" => LinkKind::Short,
        "playlist" => LinkKind::Playlist,
        "channel" => LinkKind::Channel,
        _ => LinkKind::Video,
    }
}

/// Convert database row to history record
fn row_into_history_record(row: sqlx::sqlite::SqliteRow) -> HistoryRecord {
    HistoryRecord {
        id: row.get("id"),
        url: row.get("url"),
        title: row.get("title"),
        mode: parse_mode(row.get::<&str, _>("mode")),
        quality: row.get("quality"),
        output_path: PathBuf::from(row.get::<&str, _>("output_path")),
        completed_at: row.get("completed_at"),
    }
}

/// Convert database row to failed entry
fn row_into_failed_entry(row: sqlx::sqlite::SqliteRow) -> FailedEntry {
    FailedEntry {
        url: row.get("url"),
        kind: parse_kind(row.get::<&str, _>("kind")),
        mode: parse_mode(row.get::<&str, _>("mode")),
        quality: row.get("quality"),
        format: row.get("format"),
        reason: row.get("reason"),
        failed_at: row.get("failed_at"),
        attempts: row.get::<i64, _>("attempts").max(0) as u32,
    }
}
