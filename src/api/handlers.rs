//! HTTP request handlers

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::identity::Identity;
use super::server::AppContext;
use crate::cast::DeviceDescriptor;
use crate::db::{queue, NewQueueEntry, QueueEntry};
use crate::error::{Error, Result};
use crate::playback::CoordinatorStatus;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    success: bool,
    message: String,
}

impl ActionResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub views: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    success: bool,
    id: i64,
    message: String,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    queue: Vec<QueueEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ScanParams {
    /// Discovery window in seconds
    #[serde(default = "default_scan_timeout")]
    pub timeout: u64,
}

fn default_scan_timeout() -> u64 {
    10
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    devices: Vec<DeviceDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct SelectDeviceRequest {
    pub uuid: String,
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "karabox".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Queue
// ============================================================================

/// GET /queue - pending entries in playback order
pub async fn list_queue(State(ctx): State<AppContext>) -> Result<Json<QueueResponse>> {
    let entries = queue::list_pending(&ctx.db_pool).await?;
    Ok(Json(QueueResponse { queue: entries }))
}

/// POST /queue - download the video, then add it to the queue
///
/// Acquisition happens before the entry exists, so the playback worker only
/// ever sees locally available media.
pub async fn enqueue(
    State(ctx): State<AppContext>,
    identity: Identity,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>> {
    let username = identity.require_user()?.to_string();
    if req.title.trim().is_empty() {
        return Err(Error::BadRequest("title must not be empty".to_string()));
    }

    ctx.media.acquire(&req.video_id, &req.title).await?;

    let entry = queue::enqueue(
        &ctx.db_pool,
        NewQueueEntry {
            video_id: req.video_id,
            title: req.title.clone(),
            thumbnail_url: req.thumbnail_url,
            duration: req.duration,
            views: req.views,
            username: username.clone(),
        },
        ctx.config.max_queue_size,
    )
    .await?;

    info!("Enqueued {} for {}", req.title, username);
    ctx.bus.publish().await;

    Ok(Json(EnqueueResponse {
        success: true,
        id: entry.id,
        message: "Added to queue".to_string(),
    }))
}

/// DELETE /queue/:id - remove an entry; owners only, unless admin
pub async fn remove_entry(
    State(ctx): State<AppContext>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<ActionResponse>> {
    let entry = queue::get(&ctx.db_pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("queue entry {}", id)))?;

    if !identity.is_admin && identity.username.as_deref() != Some(entry.username.as_str()) {
        return Err(Error::PermissionDenied(
            "you can only remove your own entries".to_string(),
        ));
    }

    queue::remove(&ctx.db_pool, id).await?;
    info!("Removed queue entry {} ({})", id, entry.title);
    ctx.bus.publish().await;
    Ok(ActionResponse::ok("Removed from queue"))
}

// ============================================================================
// Admin: devices
// ============================================================================

/// GET /admin/devices/scan - bounded discovery pass
pub async fn scan_devices(
    State(ctx): State<AppContext>,
    identity: Identity,
    Query(params): Query<ScanParams>,
) -> Result<Json<ScanResponse>> {
    identity.require_admin()?;
    let timeout = Duration::from_secs(params.timeout.clamp(1, 60));
    let devices = ctx.registry.scan(timeout).await;
    Ok(Json(ScanResponse { devices }))
}

/// POST /admin/devices/select
pub async fn select_device(
    State(ctx): State<AppContext>,
    identity: Identity,
    Json(req): Json<SelectDeviceRequest>,
) -> Result<Json<ActionResponse>> {
    identity.require_admin()?;
    if req.uuid.trim().is_empty() {
        return Err(Error::BadRequest("uuid must not be empty".to_string()));
    }
    ctx.coordinator.select_device(req.uuid);
    Ok(ActionResponse::ok("Device selected"))
}

// ============================================================================
// Admin: playback
// ============================================================================

/// POST /admin/playback/start
pub async fn start_playback(
    State(ctx): State<AppContext>,
    identity: Identity,
) -> Result<Json<ActionResponse>> {
    identity.require_admin()?;
    ctx.coordinator.start().await?;
    Ok(ActionResponse::ok("Playback started"))
}

/// POST /admin/playback/stop
pub async fn stop_playback(
    State(ctx): State<AppContext>,
    identity: Identity,
) -> Result<Json<ActionResponse>> {
    identity.require_admin()?;
    ctx.coordinator.stop()?;
    Ok(ActionResponse::ok("Playback stopping"))
}

/// POST /admin/playback/skip
pub async fn skip_current(
    State(ctx): State<AppContext>,
    identity: Identity,
) -> Result<Json<ActionResponse>> {
    identity.require_admin()?;
    ctx.coordinator.skip().await?;
    Ok(ActionResponse::ok("Skipping current song"))
}

/// GET /admin/status
pub async fn playback_status(
    State(ctx): State<AppContext>,
    identity: Identity,
) -> Result<Json<CoordinatorStatus>> {
    identity.require_admin()?;
    Ok(Json(ctx.coordinator.status().await?))
}

// ============================================================================
// Admin: queue
// ============================================================================

/// DELETE /admin/queue/:id - remove any entry
pub async fn admin_remove_entry(
    State(ctx): State<AppContext>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<ActionResponse>> {
    identity.require_admin()?;
    if !queue::remove(&ctx.db_pool, id).await? {
        return Err(Error::NotFound(format!("queue entry {}", id)));
    }
    info!("Admin removed queue entry {}", id);
    ctx.bus.publish().await;
    Ok(ActionResponse::ok("Removed from queue"))
}

/// POST /admin/queue/clear - drop all non-completed entries
pub async fn clear_queue(
    State(ctx): State<AppContext>,
    identity: Identity,
) -> Result<Json<ActionResponse>> {
    identity.require_admin()?;
    let removed = queue::clear_pending(&ctx.db_pool).await?;
    info!("Admin cleared the queue ({} entries)", removed);
    ctx.bus.publish().await;
    Ok(ActionResponse::ok(format!("Cleared {} entries", removed)))
}
