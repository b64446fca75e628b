//! Queue store: CRUD and FIFO reads for karaoke queue entries
//!
//! Every mutation here is a plain SQL statement; broadcasting of queue
//! changes is the caller's job (see `sse::UpdateBus`), so this module stays
//! usable from both request handlers and the playback worker.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

/// Lifecycle status of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Playing,
    Completed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Queued => "queued",
            QueueStatus::Playing => "playing",
            QueueStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(QueueStatus::Queued),
            "playing" => Some(QueueStatus::Playing),
            "completed" => Some(QueueStatus::Completed),
            _ => None,
        }
    }
}

/// One user's request to play a specific video
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub id: i64,
    pub video_id: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub duration: Option<i64>,
    pub views: Option<i64>,
    pub username: String,
    pub added_at: DateTime<Utc>,
    pub status: QueueStatus,
}

/// Fields supplied by the client when enqueueing
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub video_id: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub duration: Option<i64>,
    pub views: Option<i64>,
    pub username: String,
}

fn entry_from_row(row: &SqliteRow) -> Result<QueueEntry> {
    let status_str: String = row.try_get("status")?;
    let status = QueueStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("invalid queue status: {}", status_str)))?;
    Ok(QueueEntry {
        id: row.try_get("id")?,
        video_id: row.try_get("video_id")?,
        title: row.try_get("title")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        duration: row.try_get("duration")?,
        views: row.try_get("views")?,
        username: row.try_get("username")?,
        added_at: row.try_get("added_at")?,
        status,
    })
}

const SELECT_COLUMNS: &str =
    "id, video_id, title, thumbnail_url, duration, views, username, added_at, status";

/// Add a video to the queue
///
/// A user may not double-queue the same video while their earlier request is
/// still pending or playing; different users may each queue it, and a user
/// may re-queue after completion or removal.
pub async fn enqueue(
    pool: &Pool<Sqlite>,
    new: NewQueueEntry,
    max_queue_size: usize,
) -> Result<QueueEntry> {
    if max_queue_size > 0 {
        let current = count_pending(pool).await?;
        if current >= max_queue_size as i64 {
            return Err(Error::QueueFull(max_queue_size));
        }
    }

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM queue WHERE video_id = ? AND username = ? AND status != 'completed'",
    )
    .bind(&new.video_id)
    .bind(&new.username)
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Err(Error::DuplicateEntry);
    }

    let added_at = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO queue (video_id, title, thumbnail_url, duration, views, username, added_at, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'queued')
        "#,
    )
    .bind(&new.video_id)
    .bind(&new.title)
    .bind(&new.thumbnail_url)
    .bind(new.duration)
    .bind(new.views)
    .bind(&new.username)
    .bind(added_at)
    .execute(pool)
    .await
    .map_err(|e| {
        // A concurrent enqueue can slip past the check above; the partial
        // unique index on pending (video_id, username) catches it here.
        if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
            Error::DuplicateEntry
        } else {
            Error::Database(e)
        }
    })?;

    let id = result.last_insert_rowid();
    info!("Added to queue: {} (id: {}) by {}", new.title, id, new.username);

    Ok(QueueEntry {
        id,
        video_id: new.video_id,
        title: new.title,
        thumbnail_url: new.thumbnail_url,
        duration: new.duration,
        views: new.views,
        username: new.username,
        added_at,
        status: QueueStatus::Queued,
    })
}

/// All non-completed entries, ordered by enqueue time ascending
pub async fn list_pending(pool: &Pool<Sqlite>) -> Result<Vec<QueueEntry>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM queue WHERE status != 'completed' ORDER BY added_at ASC, id ASC",
        SELECT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

/// Head of the queue, if any
pub async fn head(pool: &Pool<Sqlite>) -> Result<Option<QueueEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM queue WHERE status != 'completed' ORDER BY added_at ASC, id ASC LIMIT 1",
        SELECT_COLUMNS
    ))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Number of non-completed entries
pub async fn count_pending(pool: &Pool<Sqlite>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue WHERE status != 'completed'")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// The entry currently marked `playing`, if any
pub async fn currently_playing(pool: &Pool<Sqlite>) -> Result<Option<QueueEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM queue WHERE status = 'playing' LIMIT 1",
        SELECT_COLUMNS
    ))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Fetch a single entry by id
pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<QueueEntry>> {
    let row = sqlx::query(&format!("SELECT {} FROM queue WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Update the status of an entry. Returns false when the id is unknown.
pub async fn set_status(pool: &Pool<Sqlite>, id: i64, status: QueueStatus) -> Result<bool> {
    let result = sqlx::query("UPDATE queue SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;

    let updated = result.rows_affected() > 0;
    if updated {
        debug!("Queue item {} status -> {}", id, status.as_str());
    }
    Ok(updated)
}

/// Remove an entry. Returns false when the id is unknown.
pub async fn remove(pool: &Pool<Sqlite>, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM queue WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    let removed = result.rows_affected() > 0;
    if removed {
        debug!("Removed queue item {}", id);
    }
    Ok(removed)
}

/// Remove entries older than the given threshold, regardless of status
pub async fn remove_older_than(pool: &Pool<Sqlite>, hours: i64) -> Result<u64> {
    let threshold = Utc::now() - Duration::hours(hours);
    let result = sqlx::query("DELETE FROM queue WHERE added_at < ?")
        .bind(threshold)
        .execute(pool)
        .await?;

    let count = result.rows_affected();
    if count > 0 {
        info!("Cleaned up {} queue item(s) older than {} hours", count, hours);
    }
    Ok(count)
}

/// Remove every non-completed entry (admin clear)
pub async fn clear_pending(pool: &Pool<Sqlite>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM queue WHERE status != 'completed'")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Reset rows stuck in `playing` back to `queued` (startup recovery)
pub async fn reset_orphaned(pool: &Pool<Sqlite>) -> Result<u64> {
    let result = sqlx::query("UPDATE queue SET status = 'queued' WHERE status = 'playing'")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
