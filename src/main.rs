//! karabox - main entry point
//!
//! Wires configuration, database, discovery, media store, update bus, and
//! the playback coordinator together, then serves the HTTP surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use karabox::api::{self, AppContext};
use karabox::cast::{DeviceRegistry, MdnsCastTransport};
use karabox::config::{Config, ConfigOverrides};
use karabox::db;
use karabox::media::MediaStore;
use karabox::playback::Coordinator;
use karabox::sse::UpdateBus;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "karabox")]
#[command(about = "Self-hosted karaoke jukebox for cast devices")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "KARABOX_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "KARABOX_PORT")]
    port: Option<u16>,

    /// Directory holding the database and downloaded videos
    #[arg(short, long, env = "KARABOX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Host cast devices use to reach this server
    #[arg(long, env = "KARABOX_SERVER_HOST")]
    server_host: Option<String>,

    /// Admin password
    #[arg(long, env = "KARABOX_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "karabox=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = Config::load(
        args.config.as_deref(),
        ConfigOverrides {
            port: args.port,
            data_dir: args.data_dir,
            server_host: args.server_host,
            admin_password: args.admin_password,
        },
    )
    .await
    .context("Failed to load configuration")?;
    let config = Arc::new(config);

    info!("Starting karabox on port {}", config.port);
    info!("Data directory: {}", config.data_dir.display());

    tokio::fs::create_dir_all(config.videos_dir())
        .await
        .context("Failed to create data directories")?;

    let db_url = format!("sqlite://{}?mode=rwc", config.db_path().display());
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .context("Failed to open database")?;
    db::initialize_database(&db_pool)
        .await
        .context("Failed to initialize database")?;
    info!("Database ready at {}", config.db_path().display());

    let registry = Arc::new(DeviceRegistry::new());
    let transport = Arc::new(MdnsCastTransport::new(Arc::clone(&registry)));
    let bus = Arc::new(UpdateBus::new(db_pool.clone()));
    let media = Arc::new(MediaStore::new(Arc::clone(&config)));
    let coordinator = Arc::new(Coordinator::new(
        transport,
        db_pool.clone(),
        Arc::clone(&bus),
        Arc::clone(&config),
    ));

    spawn_cleanup_job(db_pool.clone(), Arc::clone(&bus), Arc::clone(&config));

    let ctx = AppContext {
        db_pool,
        config,
        bus,
        coordinator,
        registry,
        media,
    };

    api::server::run(ctx, shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Periodically drop queue entries older than the configured threshold
fn spawn_cleanup_job(db_pool: sqlx::Pool<sqlx::Sqlite>, bus: Arc<UpdateBus>, config: Arc<Config>) {
    if config.cleanup_interval_hours == 0 {
        info!("Queue cleanup job disabled");
        return;
    }
    let interval = Duration::from_secs(config.cleanup_interval_hours * 3600);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so startup stays quiet
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match db::queue::remove_older_than(&db_pool, config.cleanup_threshold_hours).await {
                Ok(0) => {}
                Ok(removed) => {
                    info!("Cleanup removed {} stale queue entries", removed);
                    bus.publish().await;
                }
                Err(e) => error!("Queue cleanup failed: {}", e),
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
