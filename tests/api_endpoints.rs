//! HTTP surface integration tests
//!
//! Exercise the router directly with `tower::ServiceExt::oneshot`: identity
//! resolution, queue CRUD with ownership rules, and the admin guard.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tower::ServiceExt;

use karabox::api::server::{create_router, AppContext};
use karabox::cast::{CastConnection, CastTransport, DeviceRegistry};
use karabox::config::Config;
use karabox::db;
use karabox::media::MediaStore;
use karabox::playback::Coordinator;
use karabox::sse::UpdateBus;

struct NoDeviceTransport;

impl CastTransport for NoDeviceTransport {
    fn connect(&self, uuid: &str) -> karabox::Result<Box<dyn CastConnection>> {
        Err(karabox::Error::Device(format!("no such device: {}", uuid)))
    }
}

struct TestApp {
    router: Router,
    pool: Pool<Sqlite>,
    config: Arc<Config>,
    _data_dir: tempfile::TempDir,
}

async fn test_app() -> TestApp {
    let data_dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config {
        admin_password: "hunter2".to_string(),
        port: 8000,
        data_dir: data_dir.path().to_path_buf(),
        server_host: Some("127.0.0.1".to_string()),
        max_queue_size: 0,
        cleanup_threshold_hours: 4,
        cleanup_interval_hours: 0,
        ytdlp_bin: "yt-dlp".to_string(),
    });
    std::fs::create_dir_all(config.videos_dir()).unwrap();

    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::initialize_database(&pool).await.unwrap();

    let bus = Arc::new(UpdateBus::new(pool.clone()));
    let coordinator = Arc::new(Coordinator::new(
        Arc::new(NoDeviceTransport),
        pool.clone(),
        Arc::clone(&bus),
        Arc::clone(&config),
    ));

    let ctx = AppContext {
        db_pool: pool.clone(),
        config: Arc::clone(&config),
        bus,
        coordinator,
        registry: Arc::new(DeviceRegistry::new()),
        media: Arc::new(MediaStore::new(Arc::clone(&config))),
    };

    TestApp {
        router: create_router(ctx),
        pool,
        config,
        _data_dir: data_dir,
    }
}

/// Pretend a video was already downloaded so enqueue skips yt-dlp
fn seed_video(config: &Config, video_id: &str) {
    std::fs::write(config.video_path(video_id), b"video bytes").unwrap();
}

fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const ALICE: &str = "karabox_user=alice";
const BOB: &str = "karabox_user=bob";
const ADMIN: &str = "karabox_user=boss; karabox_admin_key=hunter2";
const BAD_ADMIN: &str = "karabox_user=boss; karabox_admin_key=wrong";

#[tokio::test]
async fn health_endpoint() {
    let app = test_app().await;
    let response = app
        .router
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["module"], "karabox");
}

#[tokio::test]
async fn queue_starts_empty() {
    let app = test_app().await;
    let response = app
        .router
        .oneshot(request("GET", "/queue", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["queue"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn enqueue_requires_identity() {
    let app = test_app().await;
    let body = json!({"video_id": "abc123", "title": "Test Song"});
    let response = app
        .router
        .oneshot(request("POST", "/queue", None, Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn enqueue_and_list() {
    let app = test_app().await;
    seed_video(&app.config, "abc123");

    let body = json!({"video_id": "abc123", "title": "Test Song", "duration": 185});
    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/queue", Some(ALICE), Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);

    let response = app
        .router
        .oneshot(request("GET", "/queue", None, None))
        .await
        .unwrap();
    let json = body_json(response).await;
    let queue = json["queue"].as_array().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0]["video_id"], "abc123");
    assert_eq!(queue[0]["username"], "alice");
    assert_eq!(queue[0]["status"], "queued");
}

#[tokio::test]
async fn duplicate_enqueue_is_conflict() {
    let app = test_app().await;
    seed_video(&app.config, "abc123");
    let body = json!({"video_id": "abc123", "title": "Test Song"});

    let first = app
        .router
        .clone()
        .oneshot(request("POST", "/queue", Some(ALICE), Some(body.clone())))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .router
        .clone()
        .oneshot(request("POST", "/queue", Some(ALICE), Some(body.clone())))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    // A different user may queue the same video
    let other = app
        .router
        .oneshot(request("POST", "/queue", Some(BOB), Some(body)))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn removal_respects_ownership() {
    let app = test_app().await;
    seed_video(&app.config, "abc123");
    let body = json!({"video_id": "abc123", "title": "Test Song"});
    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/queue", Some(ALICE), Some(body)))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_i64().unwrap();

    // Another user cannot remove it
    let response = app
        .router
        .clone()
        .oneshot(request("DELETE", &format!("/queue/{}", id), Some(BOB), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The owner can
    let response = app
        .router
        .clone()
        .oneshot(request("DELETE", &format!("/queue/{}", id), Some(ALICE), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(db::queue::count_pending(&app.pool).await.unwrap(), 0);

    // Gone now
    let response = app
        .router
        .oneshot(request("DELETE", &format!("/queue/{}", id), Some(ALICE), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_endpoints_reject_non_admins() {
    let app = test_app().await;
    for cookie in [None, Some(ALICE), Some(BAD_ADMIN)] {
        let response = app
            .router
            .clone()
            .oneshot(request("POST", "/admin/queue/clear", cookie, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn admin_can_remove_any_entry_and_clear() {
    let app = test_app().await;
    seed_video(&app.config, "abc123");
    seed_video(&app.config, "def456");
    for (vid, cookie) in [("abc123", ALICE), ("def456", BOB)] {
        let body = json!({"video_id": vid, "title": format!("Song {}", vid)});
        let response = app
            .router
            .clone()
            .oneshot(request("POST", "/queue", Some(cookie), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let entries = db::queue::list_pending(&app.pool).await.unwrap();
    let response = app
        .router
        .clone()
        .oneshot(request(
            "DELETE",
            &format!("/admin/queue/{}", entries[0].id),
            Some(ADMIN),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/admin/queue/clear", Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(db::queue::count_pending(&app.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn playback_control_surfaces_state_conflicts() {
    let app = test_app().await;

    // Nothing is running, so stop and skip are state conflicts
    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/admin/playback/stop", Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/admin/playback/skip", Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Start without a selected device is also rejected
    seed_video(&app.config, "abc123");
    let body = json!({"video_id": "abc123", "title": "Test Song"});
    app.router
        .clone()
        .oneshot(request("POST", "/queue", Some(ALICE), Some(body)))
        .await
        .unwrap();
    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/admin/playback/start", Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_status_snapshot() {
    let app = test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/admin/status", Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["is_active"], false);
    assert_eq!(json["queue_size"], 0);
    assert!(json["currently_playing"].is_null());
}

#[tokio::test]
async fn device_select_records_uuid() {
    let app = test_app().await;
    let body = json!({"uuid": "device-42"});
    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/admin/devices/select", Some(ADMIN), Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .oneshot(request("GET", "/admin/status", Some(ADMIN), None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["selected_device_uuid"], "device-42");
}
