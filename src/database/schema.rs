//! Database schema

use crate::utils::error::TubeloaderError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

/// Open (creating if needed) the store at `db_path` and make sure the tables exist
pub async fn initialize_database(db_path: &Path) -> Result<Pool<Sqlite>, TubeloaderError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    if !db_path.exists() {
        debug!("Creating database at: {:?}", db_path);
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    info!("Running database migrations");
    create_tables(&pool).await?;

    Ok(pool)
}

/// Create database tables
async fn create_tables(pool: &Pool<Sqlite>) -> Result<(), TubeloaderError> {
    // Completed downloads, append-only
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            mode TEXT NOT NULL,
            quality TEXT,
            output_path TEXT NOT NULL,
            completed_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Downloads to retry on the next launch, one row per URL
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS failed_downloads (
            url TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            mode TEXT NOT NULL,
            quality TEXT,
            format TEXT,
            reason TEXT NOT NULL,
            failed_at DATETIME NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_url ON history(url)")
        .execute(pool)
        .await?;

    debug!("Database tables created successfully");
    Ok(())
}
