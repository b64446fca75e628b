//! Playout worker
//!
//! One background thread drives the cast device through the whole playback
//! session. The CASTV2 protocol is blocking, so the worker runs on a
//! dedicated thread and bridges back to the async runtime for database and
//! broadcast calls. Device status reporting is noisy: sessions go stale,
//! idle reasons are ambiguous, and play commands are sometimes dropped
//! silently. The cycle state machine converts that noise into one clean
//! decision per item: finished, skipped, stopped, errored, or never started.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::coordinator::Coordinator;
use crate::cast::{CastConnection, IdleReason, MediaStatus, PlayerState};
use crate::db::{queue, QueueEntry, QueueStatus};

/// Poll cadence while waiting for session activation; faster than the
/// playback poll so a started session is noticed promptly.
const ACTIVATION_POLL: Duration = Duration::from_millis(250);

/// Granularity for interruptible sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// How one playback cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    /// Device reported the media finished; remove the entry
    Finished,
    /// Skip signal observed; entry removed regardless of device outcome
    Skipped,
    /// Hard duration ceiling hit; stop issued, entry removed
    TimedOut,
    /// Stop signal observed; entry stays queued
    Stopped,
    /// Session never became active within the timeout; entry stays queued
    /// and is retried as the head on the next cycle
    NeverActivated,
    /// Idle with an error or unrecognized reason, or unknown player state;
    /// entry stays queued for manual retry
    Ambiguous,
    /// The connection itself failed; entry stays queued, reconnect next
    DeviceFault,
}

impl CycleOutcome {
    fn removes_entry(self) -> bool {
        matches!(self, Self::Finished | Self::Skipped | Self::TimedOut)
    }
}

/// Clears the active slot when the worker exits, whatever the exit path.
struct ActiveGuard {
    coordinator: Arc<Coordinator>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.coordinator.clear_active();
        info!("Playout worker finished");
    }
}

pub(super) fn run(coordinator: Arc<Coordinator>, handle: Handle) {
    info!("Playout worker started");
    let _guard = ActiveGuard {
        coordinator: Arc::clone(&coordinator),
    };

    let Some(device_uuid) = coordinator.selected_device() else {
        error!("Worker started without a selected device");
        return;
    };

    let timings = coordinator.timings.clone();
    let mut connection: Option<Box<dyn CastConnection>> = None;

    loop {
        if coordinator.stop_requested() {
            info!("Stop requested, exiting playout loop");
            break;
        }
        if !coordinator.is_active() {
            break;
        }

        let head = match handle.block_on(queue::head(&coordinator.db)) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                info!("Queue is empty, stopping playback");
                break;
            }
            Err(e) => {
                error!("Failed to read queue head: {}", e);
                sleep_interruptible(&coordinator, timings.inter_song_pause);
                continue;
            }
        };

        // Reconnect when the handle is missing or reports dead
        let needs_connect = match connection.as_mut() {
            Some(conn) => !conn.is_connected(),
            None => true,
        };
        if needs_connect {
            if let Some(mut stale) = connection.take() {
                stale.disconnect();
            }
            match coordinator.transport.connect(&device_uuid) {
                Ok(conn) => connection = Some(conn),
                Err(e) => {
                    warn!(
                        "Device connection failed ({}), retrying in {:?}",
                        e, timings.connect_retry_delay
                    );
                    sleep_interruptible(&coordinator, timings.connect_retry_delay);
                    continue;
                }
            }
        }
        let Some(conn) = connection.as_mut() else {
            continue;
        };

        let outcome = play_one(&coordinator, &handle, conn.as_mut(), &head);

        // Every cycle resolves its own media session: the outcomes that
        // leave the device playing have already issued the stop command.
        let apply = async {
            if outcome.removes_entry() {
                info!("Removing from queue: {}", head.title);
                queue::remove(&coordinator.db, head.id).await?;
            } else {
                info!("Keeping in queue: {}", head.title);
                queue::set_status(&coordinator.db, head.id, QueueStatus::Queued).await?;
            }
            crate::error::Result::Ok(())
        };
        if let Err(e) = handle.block_on(apply) {
            error!("Failed to apply cycle outcome for {}: {}", head.title, e);
        }
        handle.block_on(coordinator.bus.publish());

        match outcome {
            CycleOutcome::Stopped => break,
            CycleOutcome::DeviceFault => {
                if let Some(mut dead) = connection.take() {
                    dead.disconnect();
                }
            }
            _ => {}
        }

        sleep_interruptible(&coordinator, timings.inter_song_pause);
    }

    if let Some(mut conn) = connection.take() {
        conn.disconnect();
        info!("Disconnected from cast device");
    }
}

/// Play one queue entry to a terminal decision
fn play_one(
    coordinator: &Coordinator,
    handle: &Handle,
    conn: &mut dyn CastConnection,
    entry: &QueueEntry,
) -> CycleOutcome {
    let timings = &coordinator.timings;

    handle.block_on(async {
        if let Err(e) = queue::set_status(&coordinator.db, entry.id, QueueStatus::Playing).await {
            error!("Failed to mark entry {} playing: {}", entry.id, e);
        }
        coordinator.bus.publish().await;
    });

    let url = coordinator.config.video_url(&entry.video_id);
    info!("Playing: {} ({})", entry.title, url);
    if let Err(e) = conn.play(&url) {
        error!("Failed to start playback of {}: {}", entry.title, e);
        return CycleOutcome::DeviceFault;
    }

    // Devices sometimes drop a load silently; bound the wait and retry the
    // same entry next cycle if the session never appears.
    info!("Waiting for media session...");
    let deadline = Instant::now() + timings.session_activation_timeout;
    loop {
        if coordinator.stop_requested() {
            let _ = conn.stop();
            return CycleOutcome::Stopped;
        }
        match conn.status() {
            Ok(status) if status.session_active => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Status poll failed while waiting for session: {}", e);
                return CycleOutcome::DeviceFault;
            }
        }
        if Instant::now() >= deadline {
            warn!("Media session did not start for: {}", entry.title);
            return CycleOutcome::NeverActivated;
        }
        std::thread::sleep(ACTIVATION_POLL.min(timings.poll_interval));
    }

    // The first status after activation can still describe the previous
    // item; without this delay a leftover FINISHED ends the new one early.
    std::thread::sleep(timings.status_grace);
    debug!("Status refresh delay complete, monitoring playback");

    let session_start = Instant::now();
    loop {
        if coordinator.stop_requested() {
            info!("Stop requested during playback");
            let _ = conn.stop();
            return CycleOutcome::Stopped;
        }
        if coordinator.take_skip() {
            info!("Skip requested");
            let _ = conn.stop();
            return CycleOutcome::Skipped;
        }

        match conn.status() {
            Ok(status) => {
                if let Some(outcome) = classify_status(&status, &entry.title) {
                    return outcome;
                }
            }
            Err(e) => {
                warn!("Status poll failed during playback: {}", e);
                return CycleOutcome::DeviceFault;
            }
        }

        if session_start.elapsed() >= timings.max_session_duration {
            warn!("Maximum playback duration exceeded for: {}", entry.title);
            let _ = conn.stop();
            return CycleOutcome::TimedOut;
        }
        std::thread::sleep(timings.poll_interval);
    }
}

/// Interpret one device status report; `None` means keep polling
fn classify_status(status: &MediaStatus, title: &str) -> Option<CycleOutcome> {
    match status.player_state {
        PlayerState::Idle => match status.idle_reason {
            // Transitional: new media still loading, or the device is
            // between reports
            Some(IdleReason::Interrupted) | None => {
                debug!("Idle (transitional), continuing to poll");
                None
            }
            Some(IdleReason::Finished) => {
                info!("Finished playing: {}", title);
                Some(CycleOutcome::Finished)
            }
            Some(IdleReason::Error) => {
                error!("Playback error for: {}, keeping in queue", title);
                Some(CycleOutcome::Ambiguous)
            }
            // Cancelled, Unknown, and anything unrecognized: preserve the
            // entry rather than guess finished vs. failed
            Some(reason) => {
                warn!("Idle ({:?}) for: {}, keeping in queue", reason, title);
                Some(CycleOutcome::Ambiguous)
            }
        },
        PlayerState::Unknown => {
            warn!("Unknown player state for: {}, keeping in queue", title);
            Some(CycleOutcome::Ambiguous)
        }
        PlayerState::Buffering | PlayerState::Playing | PlayerState::Paused => None,
    }
}

/// Sleep in slices so stop requests cut waits short
fn sleep_interruptible(coordinator: &Coordinator, total: Duration) {
    let deadline = Instant::now() + total;
    loop {
        if coordinator.stop_requested() || !coordinator.is_active() {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(SLEEP_SLICE.min(remaining));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle(reason: Option<IdleReason>) -> MediaStatus {
        MediaStatus {
            session_active: true,
            player_state: PlayerState::Idle,
            idle_reason: reason,
        }
    }

    #[test]
    fn test_finished_removes_entry() {
        let outcome = classify_status(&idle(Some(IdleReason::Finished)), "t").unwrap();
        assert_eq!(outcome, CycleOutcome::Finished);
        assert!(outcome.removes_entry());
    }

    #[test]
    fn test_transitional_idle_keeps_polling() {
        assert!(classify_status(&idle(Some(IdleReason::Interrupted)), "t").is_none());
        assert!(classify_status(&idle(None), "t").is_none());
    }

    #[test]
    fn test_error_and_unrecognized_reasons_preserve_entry() {
        for reason in [IdleReason::Error, IdleReason::Cancelled, IdleReason::Unknown] {
            let outcome = classify_status(&idle(Some(reason)), "t").unwrap();
            assert_eq!(outcome, CycleOutcome::Ambiguous);
            assert!(!outcome.removes_entry());
        }
    }

    #[test]
    fn test_unknown_player_state_preserves_entry() {
        let status = MediaStatus {
            session_active: true,
            player_state: PlayerState::Unknown,
            idle_reason: None,
        };
        let outcome = classify_status(&status, "t").unwrap();
        assert!(!outcome.removes_entry());
    }

    #[test]
    fn test_active_states_keep_polling() {
        for state in [PlayerState::Buffering, PlayerState::Playing, PlayerState::Paused] {
            let status = MediaStatus {
                session_active: true,
                player_state: state,
                idle_reason: None,
            };
            assert!(classify_status(&status, "t").is_none());
        }
    }
}
