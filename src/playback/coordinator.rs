//! Playback coordinator control surface
//!
//! All coordinator state lives under one mutex and is only ever touched
//! through the operations here. Request handlers post signals (stop, skip)
//! or read snapshots; the worker thread owns the device connection
//! exclusively and is the only code that performs device I/O.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use sqlx::{Pool, Sqlite};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::info;

use super::worker;
use crate::cast::CastTransport;
use crate::config::Config;
use crate::db::{queue, QueueEntry};
use crate::error::Result;
use crate::sse::UpdateBus;

/// Rejected control operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("playback is already active")]
    AlreadyActive,
    #[error("playback is not active")]
    NotActive,
    #[error("no playback device selected")]
    NoDeviceSelected,
    #[error("the queue is empty")]
    QueueEmpty,
}

/// Worker timing knobs
///
/// Defaults are production values; tests shrink them to keep scenario runs
/// fast.
#[derive(Debug, Clone)]
pub struct WorkerTimings {
    /// How long to wait for the device to report an active media session
    /// after a load. Devices occasionally drop a play command silently.
    pub session_activation_timeout: Duration,
    /// Ignore device status this long after session activation; the first
    /// reports can be stale leftovers from the previous item.
    pub status_grace: Duration,
    /// Device status poll interval during playback
    pub poll_interval: Duration,
    /// Hard ceiling on one item's playback, a safety valve against devices
    /// that never report finished
    pub max_session_duration: Duration,
    /// Backoff between device connection attempts
    pub connect_retry_delay: Duration,
    /// Pause between consecutive queue items
    pub inter_song_pause: Duration,
}

impl Default for WorkerTimings {
    fn default() -> Self {
        Self {
            session_activation_timeout: Duration::from_secs(30),
            status_grace: Duration::from_millis(500),
            poll_interval: Duration::from_secs(2),
            max_session_duration: Duration::from_secs(20 * 60),
            connect_retry_delay: Duration::from_secs(5),
            inter_song_pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct CoordinatorState {
    /// Playback has been started and not yet wound down
    pub active: bool,
    /// A worker thread exists (it may still be cleaning up after `active`
    /// drops); `start()` refuses while either flag is set
    pub worker_running: bool,
    pub selected_device_uuid: Option<String>,
    pub stop_requested: bool,
    pub skip_requested: bool,
}

/// Snapshot returned by `status()`; never touches the device
#[derive(Debug, Serialize)]
pub struct CoordinatorStatus {
    pub is_active: bool,
    pub selected_device_uuid: Option<String>,
    pub queue_size: i64,
    pub currently_playing: Option<QueueEntry>,
}

pub struct Coordinator {
    pub(super) state: Mutex<CoordinatorState>,
    pub(super) transport: Arc<dyn CastTransport>,
    pub(super) db: Pool<Sqlite>,
    pub(super) bus: Arc<UpdateBus>,
    pub(super) config: Arc<Config>,
    pub(super) timings: WorkerTimings,
}

impl Coordinator {
    pub fn new(
        transport: Arc<dyn CastTransport>,
        db: Pool<Sqlite>,
        bus: Arc<UpdateBus>,
        config: Arc<Config>,
    ) -> Self {
        Self::with_timings(transport, db, bus, config, WorkerTimings::default())
    }

    pub fn with_timings(
        transport: Arc<dyn CastTransport>,
        db: Pool<Sqlite>,
        bus: Arc<UpdateBus>,
        config: Arc<Config>,
        timings: WorkerTimings,
    ) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            transport,
            db,
            bus,
            config,
            timings,
        }
    }

    /// Record the device playback should use
    ///
    /// Accepted even when the device is not currently visible; devices may
    /// appear on the network after selection. Idempotent.
    pub fn select_device(&self, uuid: String) {
        let mut state = self.state.lock().unwrap();
        info!("Selected cast device: {}", uuid);
        state.selected_device_uuid = Some(uuid);
    }

    /// Start playback from the head of the queue
    ///
    /// Spawns exactly one background worker; this is the only code path
    /// that creates one.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let pending = queue::count_pending(&self.db).await?;

        {
            let mut state = self.state.lock().unwrap();
            if state.active || state.worker_running {
                return Err(ControlError::AlreadyActive.into());
            }
            if state.selected_device_uuid.is_none() {
                return Err(ControlError::NoDeviceSelected.into());
            }
            if pending == 0 {
                return Err(ControlError::QueueEmpty.into());
            }
            state.active = true;
            state.worker_running = true;
            state.stop_requested = false;
            state.skip_requested = false;
        }

        let coordinator = Arc::clone(self);
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || worker::run(coordinator, handle));
        info!("Playback started");
        Ok(())
    }

    /// Signal the worker to stop; returns without waiting for it
    ///
    /// The in-flight entry stays in the queue. Callers observe eventual
    /// deactivation via `status()`.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.active {
            return Err(ControlError::NotActive.into());
        }
        state.stop_requested = true;
        info!("Stop signal sent to playout worker");
        Ok(())
    }

    /// Signal the worker to skip the current item; it is removed from the
    /// queue regardless of how the device reacts.
    pub async fn skip(&self) -> Result<()> {
        if !self.is_active() {
            return Err(ControlError::NotActive.into());
        }
        if queue::count_pending(&self.db).await? == 0 {
            return Err(ControlError::QueueEmpty.into());
        }

        // A worker exiting between the check and this store is harmless:
        // `start()` and the worker's exit path both clear stale signals.
        self.state.lock().unwrap().skip_requested = true;
        info!("Skip signal sent to playout worker");
        Ok(())
    }

    /// Current coordinator and queue snapshot
    pub async fn status(&self) -> Result<CoordinatorStatus> {
        let (is_active, selected_device_uuid) = {
            let state = self.state.lock().unwrap();
            (state.active, state.selected_device_uuid.clone())
        };
        Ok(CoordinatorStatus {
            is_active,
            selected_device_uuid,
            queue_size: queue::count_pending(&self.db).await?,
            currently_playing: queue::currently_playing(&self.db).await?,
        })
    }

    // Worker-side accessors. The worker never holds the lock across I/O.

    pub(super) fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    pub(super) fn stop_requested(&self) -> bool {
        self.state.lock().unwrap().stop_requested
    }

    /// Consume a pending skip signal
    pub(super) fn take_skip(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.skip_requested)
    }

    pub(super) fn selected_device(&self) -> Option<String> {
        self.state.lock().unwrap().selected_device_uuid.clone()
    }

    /// Worker exit path: release the active slot and clear signals
    pub(super) fn clear_active(&self) {
        let mut state = self.state.lock().unwrap();
        state.active = false;
        state.worker_running = false;
        state.stop_requested = false;
        state.skip_requested = false;
    }
}
