//! CASTV2 media transport
//!
//! The playback worker drives a device through the `CastTransport` /
//! `CastConnection` traits so tests can substitute a scripted device. The
//! real implementation speaks the CASTV2 protocol over a blocking TLS
//! socket; all calls here are synchronous and must run off the async
//! runtime.

use std::sync::Arc;
use std::time::Duration;

use rust_cast::channels::media::{self, Media, StreamType};
use rust_cast::channels::receiver::CastDeviceApp;
use rust_cast::CastDevice;
use tracing::{debug, info, warn};

use super::discovery::DeviceRegistry;
use crate::error::{Error, Result};

/// Re-scan window used when a selected device is missing from the cache
const RESOLVE_SCAN_WINDOW: Duration = Duration::from_secs(5);

/// Player state reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Buffering,
    Playing,
    Paused,
    /// No media session exists, or the device reported something unrecognized
    Unknown,
}

/// Why the player went idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// Media played to the end
    Finished,
    /// A sender requested stop
    Cancelled,
    /// Another load displaced this media
    Interrupted,
    Error,
    Unknown,
}

/// Snapshot of the device's media session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaStatus {
    /// Whether the device reports any media session at all
    pub session_active: bool,
    pub player_state: PlayerState,
    pub idle_reason: Option<IdleReason>,
}

impl MediaStatus {
    /// Status used when the device reports no media session
    pub fn inactive() -> Self {
        Self {
            session_active: false,
            player_state: PlayerState::Unknown,
            idle_reason: None,
        }
    }
}

/// Factory for device connections, keyed by device uuid
pub trait CastTransport: Send + Sync {
    fn connect(&self, uuid: &str) -> Result<Box<dyn CastConnection>>;
}

/// One live session with a cast device
///
/// Connections are created and dropped entirely within the playback worker
/// thread, so the trait carries no `Send` bound.
pub trait CastConnection {
    /// Load and start the media at `url`
    fn play(&mut self, url: &str) -> Result<()>;

    /// Poll the current media session status
    fn status(&mut self) -> Result<MediaStatus>;

    /// Stop the current media session, if one exists
    fn stop(&mut self) -> Result<()>;

    /// Cheap liveness probe of the underlying socket
    fn is_connected(&mut self) -> bool;

    /// Best-effort teardown; errors are swallowed
    fn disconnect(&mut self);
}

/// Production transport backed by mDNS discovery and the CASTV2 protocol
pub struct MdnsCastTransport {
    registry: Arc<DeviceRegistry>,
}

impl MdnsCastTransport {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }
}

impl CastTransport for MdnsCastTransport {
    fn connect(&self, uuid: &str) -> Result<Box<dyn CastConnection>> {
        let resolved = match self.registry.resolve(uuid) {
            Some(device) => device,
            None => {
                // Selected before a restart, or the address cache is cold
                info!("Device {} not in discovery cache, re-scanning", uuid);
                self.registry.scan_blocking(RESOLVE_SCAN_WINDOW);
                self.registry
                    .resolve(uuid)
                    .ok_or_else(|| Error::Device(format!("cast device not found: {}", uuid)))?
            }
        };

        info!(
            "Connecting to cast device {} at {}:{}",
            resolved.name, resolved.addr, resolved.port
        );
        let device =
            CastDevice::connect_without_host_verification(resolved.addr.to_string(), resolved.port)
                .map_err(|e| Error::Device(format!("failed to connect to {}: {}", resolved.name, e)))?;

        device
            .connection
            .connect("receiver-0")
            .map_err(|e| Error::Device(format!("failed to connect to receiver: {}", e)))?;

        let app = device
            .receiver
            .launch_app(&CastDeviceApp::DefaultMediaReceiver)
            .map_err(|e| Error::Device(format!("failed to launch media receiver: {}", e)))?;

        device
            .connection
            .connect(app.transport_id.as_str())
            .map_err(|e| Error::Device(format!("failed to connect to media app: {}", e)))?;

        Ok(Box::new(CastDeviceConnection {
            device,
            transport_id: app.transport_id,
            session_id: app.session_id,
            media_session_id: None,
        }))
    }
}

struct CastDeviceConnection {
    device: CastDevice<'static>,
    transport_id: String,
    session_id: String,
    media_session_id: Option<i32>,
}

impl CastConnection for CastDeviceConnection {
    fn play(&mut self, url: &str) -> Result<()> {
        let media = Media {
            content_id: url.to_string(),
            content_type: "video/mp4".to_string(),
            stream_type: StreamType::Buffered,
            duration: None,
            metadata: None,
        };
        let status = self
            .device
            .media
            .load(self.transport_id.as_str(), self.session_id.as_str(), &media)
            .map_err(|e| Error::Device(format!("failed to load media: {}", e)))?;
        self.media_session_id = status.entries.first().map(|e| e.media_session_id);
        debug!(
            "Media loaded on {} (media session {:?})",
            self.transport_id, self.media_session_id
        );
        Ok(())
    }

    fn status(&mut self) -> Result<MediaStatus> {
        let status = self
            .device
            .media
            .get_status(self.transport_id.as_str(), None)
            .map_err(|e| Error::Device(format!("failed to get media status: {}", e)))?;

        let Some(entry) = status.entries.first() else {
            return Ok(MediaStatus::inactive());
        };
        self.media_session_id = Some(entry.media_session_id);

        Ok(MediaStatus {
            session_active: true,
            player_state: map_player_state(&entry.player_state),
            idle_reason: entry.idle_reason.as_ref().map(map_idle_reason),
        })
    }

    fn stop(&mut self) -> Result<()> {
        let Some(media_session_id) = self.media_session_id else {
            debug!("No media session to stop on {}", self.transport_id);
            return Ok(());
        };
        self.device
            .media
            .stop(self.transport_id.as_str(), media_session_id)
            .map_err(|e| Error::Device(format!("failed to stop media: {}", e)))?;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.device.heartbeat.ping().is_ok()
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.device.receiver.stop_app(self.session_id.as_str()) {
            warn!("Failed to stop receiver app: {}", e);
        }
        if let Err(e) = self.device.connection.disconnect(self.transport_id.as_str()) {
            debug!("Failed to disconnect from media app: {}", e);
        }
    }
}

fn map_player_state(state: &media::PlayerState) -> PlayerState {
    match state {
        media::PlayerState::Idle => PlayerState::Idle,
        media::PlayerState::Buffering => PlayerState::Buffering,
        media::PlayerState::Playing => PlayerState::Playing,
        media::PlayerState::Paused => PlayerState::Paused,
    }
}

fn map_idle_reason(reason: &media::IdleReason) -> IdleReason {
    match reason {
        media::IdleReason::Finished => IdleReason::Finished,
        media::IdleReason::Cancelled => IdleReason::Cancelled,
        media::IdleReason::Interrupted => IdleReason::Interrupted,
        media::IdleReason::Error => IdleReason::Error,
    }
}
