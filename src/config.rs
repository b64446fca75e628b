//! Configuration management for karabox
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap**: data directory, port, admin password, queue limits
//! 2. **CLI/env overrides**: applied on top of the TOML values
//!
//! All settings have built-in defaults except the admin password, which must
//! be provided via the TOML file or `KARABOX_ADMIN_PASSWORD`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The application must restart
/// to pick up changes.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Password granting privileged (admin) access
    #[serde(default)]
    pub admin_password: Option<String>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the database and downloaded videos
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Host (IP or name) cast devices use to reach this server.
    /// Auto-detected from the local routing table when unset.
    #[serde(default)]
    pub server_host: Option<String>,

    /// Maximum number of pending queue entries (0 = unlimited)
    #[serde(default)]
    pub max_queue_size: usize,

    /// Remove queue entries older than this many hours
    #[serde(default = "default_cleanup_threshold")]
    pub cleanup_threshold_hours: i64,

    /// How often the cleanup job runs (0 disables it)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_hours: u64,

    /// yt-dlp executable used for video acquisition
    #[serde(default = "default_ytdlp_bin")]
    pub ytdlp_bin: String,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            admin_password: None,
            port: default_port(),
            data_dir: default_data_dir(),
            server_host: None,
            max_queue_size: 0,
            cleanup_threshold_hours: default_cleanup_threshold(),
            cleanup_interval_hours: default_cleanup_interval(),
            ytdlp_bin: default_ytdlp_bin(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_cleanup_threshold() -> i64 {
    4
}

fn default_cleanup_interval() -> u64 {
    1
}

fn default_ytdlp_bin() -> String {
    "yt-dlp".to_string()
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub server_host: Option<String>,
    pub admin_password: Option<String>,
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub admin_password: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub server_host: Option<String>,
    pub max_queue_size: usize,
    pub cleanup_threshold_hours: i64,
    pub cleanup_interval_hours: u64,
    pub ytdlp_bin: String,
}

impl Config {
    /// Load configuration from an optional TOML file plus CLI overrides
    ///
    /// A missing config file is not an error; defaults are used. A present
    /// but unparsable file is.
    pub async fn load(toml_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) if path.exists() => {
                let toml_str = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Config(format!("Failed to read config file {:?}: {}", path, e))
                })?;
                let parsed: TomlConfig = toml::from_str(&toml_str)
                    .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
                info!("Loaded configuration from {:?}", path);
                parsed
            }
            Some(path) => {
                warn!("Config file {:?} not found, using defaults", path);
                TomlConfig::default()
            }
            None => TomlConfig::default(),
        };

        let admin_password = overrides
            .admin_password
            .or(toml_config.admin_password)
            .ok_or_else(|| {
                Error::Config(
                    "admin_password must be set (config file or KARABOX_ADMIN_PASSWORD)"
                        .to_string(),
                )
            })?;

        Ok(Config {
            admin_password,
            port: overrides.port.unwrap_or(toml_config.port),
            data_dir: overrides.data_dir.unwrap_or(toml_config.data_dir),
            server_host: overrides.server_host.or(toml_config.server_host),
            max_queue_size: toml_config.max_queue_size,
            cleanup_threshold_hours: toml_config.cleanup_threshold_hours,
            cleanup_interval_hours: toml_config.cleanup_interval_hours,
            ytdlp_bin: toml_config.ytdlp_bin,
        })
    }

    /// Path to the SQLite database file
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("karabox.db")
    }

    /// Directory holding downloaded video files
    pub fn videos_dir(&self) -> PathBuf {
        self.data_dir.join("videos")
    }

    /// Path to a specific downloaded video
    pub fn video_path(&self, video_id: &str) -> PathBuf {
        self.videos_dir().join(format!("{}.mp4", video_id))
    }

    /// Host cast devices use to reach this server
    ///
    /// Explicit configuration wins; otherwise the local network IP is
    /// auto-detected via the routing table.
    pub fn resolved_server_host(&self) -> String {
        if let Some(host) = &self.server_host {
            return host.clone();
        }
        detect_local_ip().unwrap_or_else(|| {
            warn!("Failed to auto-detect local IP, falling back to localhost");
            "localhost".to_string()
        })
    }

    /// HTTP URL for a video file, reachable by cast devices on the LAN
    pub fn video_url(&self, video_id: &str) -> String {
        let host = self.resolved_server_host();
        let url = format!("http://{}:{}/data/videos/{}.mp4", host, self.port, video_id);
        if host == "localhost" {
            warn!("Generated cast URL with 'localhost' - devices may not reach it: {}", url);
        }
        url
    }
}

/// Determine the local network IP by opening a UDP socket toward a public
/// address. No packets are sent; this only consults the routing table.
fn detect_local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_without_file() {
        let overrides = ConfigOverrides {
            admin_password: Some("secret".to_string()),
            ..Default::default()
        };
        let config = Config::load(None, overrides).await.unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_queue_size, 0);
        assert_eq!(config.cleanup_threshold_hours, 4);
        assert!(config.db_path().ends_with("karabox.db"));
    }

    #[tokio::test]
    async fn test_missing_admin_password_is_an_error() {
        let err = Config::load(None, ConfigOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_toml_values_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("karabox.toml");
        tokio::fs::write(
            &path,
            r#"
admin_password = "hunter2"
port = 9000
max_queue_size = 25
server_host = "192.168.1.50"
"#,
        )
        .await
        .unwrap();

        let overrides = ConfigOverrides {
            port: Some(9001),
            ..Default::default()
        };
        let config = Config::load(Some(&path), overrides).await.unwrap();
        assert_eq!(config.port, 9001); // CLI wins over TOML
        assert_eq!(config.max_queue_size, 25);
        assert_eq!(config.resolved_server_host(), "192.168.1.50");
        assert_eq!(
            config.video_url("abc123"),
            "http://192.168.1.50:9001/data/videos/abc123.mp4"
        );
    }
}
