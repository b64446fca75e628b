//! HTTP server setup and routing

use axum::{
    routing::{delete, get, post},
    Router,
};
use sqlx::{Pool, Sqlite};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cast::DeviceRegistry;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::media::MediaStore;
use crate::playback::Coordinator;
use crate::sse::UpdateBus;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub db_pool: Pool<Sqlite>,
    pub config: Arc<Config>,
    pub bus: Arc<UpdateBus>,
    pub coordinator: Arc<Coordinator>,
    pub registry: Arc<DeviceRegistry>,
    pub media: Arc<MediaStore>,
}

/// Build the application router
pub fn create_router(ctx: AppContext) -> Router {
    let videos_dir = ctx.config.videos_dir();

    Router::new()
        .route("/health", get(super::handlers::health))
        // Queue (any viewer)
        .route("/queue", get(super::handlers::list_queue))
        .route("/queue", post(super::handlers::enqueue))
        .route("/queue/:id", delete(super::handlers::remove_entry))
        .route("/queue/sse", get(super::sse::queue_events))
        // Admin control surface
        .route("/admin/devices/scan", get(super::handlers::scan_devices))
        .route("/admin/devices/select", post(super::handlers::select_device))
        .route("/admin/playback/start", post(super::handlers::start_playback))
        .route("/admin/playback/stop", post(super::handlers::stop_playback))
        .route("/admin/playback/skip", post(super::handlers::skip_current))
        .route("/admin/status", get(super::handlers::playback_status))
        .route("/admin/queue/:id", delete(super::handlers::admin_remove_entry))
        .route("/admin/queue/clear", post(super::handlers::clear_queue))
        // Downloaded videos, fetched by the cast device over plain HTTP
        .nest_service("/data/videos", ServeDir::new(videos_dir))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the HTTP server until shutdown
pub async fn run(ctx: AppContext, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<()> {
    let port = ctx.config.port;
    let app = create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
