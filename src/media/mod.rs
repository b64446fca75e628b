//! Local media acquisition
//!
//! Videos are fetched once with yt-dlp into the data directory and served
//! back to the cast device over plain HTTP. The format selector prefers
//! H.264/AAC and never picks AV1, which cast devices cannot decode.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// yt-dlp format selector, ordered by cast device compatibility
const FORMAT_SELECTOR: &str = concat!(
    "bestvideo[vcodec^=avc1][ext=mp4]+bestaudio[ext=m4a]/",
    "bestvideo[vcodec^=avc1]+bestaudio/",
    "bestvideo[vcodec^=vp9][ext=webm]+bestaudio[ext=webm]/",
    "bestvideo[vcodec^=vp09]+bestaudio/",
    "bestvideo[vcodec!=av01][ext=mp4]+bestaudio/",
    "bestvideo[vcodec!=av01]+bestaudio/",
    "best[vcodec!=av01]",
);

/// Downloads videos on demand and answers availability checks
pub struct MediaStore {
    config: Arc<Config>,
}

impl MediaStore {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Whether a non-empty local file already exists for this video
    pub fn is_available(&self, video_id: &str) -> bool {
        let path = self.config.video_path(video_id);
        path.metadata().map(|m| m.len() > 0).unwrap_or(false)
    }

    pub fn video_path(&self, video_id: &str) -> PathBuf {
        self.config.video_path(video_id)
    }

    /// Ensure the video is on disk, downloading it if necessary
    ///
    /// A no-op when the file already exists. On failure any partial file is
    /// removed so a retry starts clean.
    pub async fn acquire(&self, video_id: &str, title: &str) -> Result<PathBuf> {
        validate_video_id(video_id)?;
        let path = self.config.video_path(video_id);

        if self.is_available(video_id) {
            info!("Video already downloaded: {} - {}", video_id, title);
            return Ok(path);
        }

        info!("Starting download: {} - {}", video_id, title);
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let output_template = self
            .config
            .videos_dir()
            .join(format!("{}.%(ext)s", video_id));

        let output = Command::new(&self.config.ytdlp_bin)
            .arg("--format")
            .arg(FORMAT_SELECTOR)
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("--output")
            .arg(&output_template)
            .arg("--no-playlist")
            .arg(&url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::Download(format!(
                        "downloader '{}' is not installed on the server",
                        self.config.ytdlp_bin
                    ))
                } else {
                    Error::Download(format!("failed to run downloader: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Download failed for {}: {}", video_id, stderr.trim());
            self.cleanup_partial(video_id).await;
            return Err(Error::Download(friendly_download_error(&stderr)));
        }

        if !self.is_available(video_id) {
            self.cleanup_partial(video_id).await;
            return Err(Error::Download(
                "download completed but file not found".to_string(),
            ));
        }

        let size_mb = path.metadata().map(|m| m.len()).unwrap_or(0) as f64 / (1024.0 * 1024.0);
        info!(
            "Download successful: {} - {} ({:.2} MB)",
            video_id, title, size_mb
        );
        Ok(path)
    }

    async fn cleanup_partial(&self, video_id: &str) {
        let path = self.config.video_path(video_id);
        if path.exists() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to clean up partial download {:?}: {}", path, e);
            }
        }
    }
}

/// Video ids are embedded into shell arguments, URLs, and file names;
/// restrict them to the characters video ids actually use.
fn validate_video_id(video_id: &str) -> Result<()> {
    let ok = !video_id.is_empty()
        && video_id.len() <= 32
        && video_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::BadRequest(format!("invalid video id: {:?}", video_id)))
    }
}

/// Map raw downloader stderr to a message fit for end users
fn friendly_download_error(stderr: &str) -> String {
    let lower = stderr.to_lowercase();
    if lower.contains("ffmpeg") {
        "server configuration error: ffmpeg is not installed".to_string()
    } else if stderr.contains("Video unavailable") {
        "this video is unavailable or has been removed".to_string()
    } else if stderr.contains("Private video") {
        "this video is private and cannot be downloaded".to_string()
    } else if stderr.contains("403") || stderr.contains("Forbidden") {
        "access to this video is forbidden".to_string()
    } else if lower.contains("disk") || lower.contains("space") {
        "insufficient disk space to download video".to_string()
    } else {
        "failed to download video, please try another one".to_string()
    }
}
