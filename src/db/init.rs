//! Database initialization
//!
//! Creates the queue table and index if missing, and recovers rows left in
//! an inconsistent state by a previous process.

use crate::error::Result;
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Schema for the queue table
///
/// `added_at` is an RFC 3339 UTC timestamp; ordering on it is the queue order.
const CREATE_QUEUE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    video_id TEXT NOT NULL,
    title TEXT NOT NULL,
    thumbnail_url TEXT,
    duration INTEGER,
    views INTEGER,
    username TEXT NOT NULL,
    added_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'queued' CHECK(status IN ('queued', 'playing', 'completed'))
)
"#;

const CREATE_QUEUE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_queue_added_at ON queue(added_at)";

/// At most one non-completed entry per (video_id, username). The enqueue
/// path checks this in SQL first for a friendly error, but two concurrent
/// enqueues can both pass that check; the index makes the race lose.
const CREATE_QUEUE_PENDING_UNIQUE: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_pending_unique
ON queue(video_id, username) WHERE status != 'completed'
"#;

/// Initialize all required database structures
pub async fn initialize_database(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Initializing database structures");

    sqlx::query(CREATE_QUEUE_TABLE).execute(pool).await?;
    sqlx::query(CREATE_QUEUE_INDEX).execute(pool).await?;
    sqlx::query(CREATE_QUEUE_PENDING_UNIQUE).execute(pool).await?;

    // Rows stuck in 'playing' from a previous run go back to 'queued' so the
    // coordinator can pick them up again.
    let reset = super::queue::reset_orphaned(pool).await?;
    if reset > 0 {
        info!("Reset {} orphaned queue item(s) to 'queued'", reset);
    }

    info!("Database initialization complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();

        initialize_database(&pool).await.unwrap();
        initialize_database(&pool).await.unwrap();

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='queue')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists);
    }
}
