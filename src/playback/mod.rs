//! Playback coordination: the admin-facing control surface and the single
//! background worker that drives the cast device.

pub mod coordinator;
mod worker;

pub use coordinator::{ControlError, Coordinator, CoordinatorStatus, WorkerTimings};
