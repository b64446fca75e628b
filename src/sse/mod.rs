//! Live queue updates: in-process fan-out plus per-viewer HTML rendering

pub mod bus;
pub mod render;

pub use bus::UpdateBus;
