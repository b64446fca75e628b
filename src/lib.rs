//! # karabox
//!
//! Self-hosted karaoke jukebox: guests queue songs from their phones, an
//! admin drives playback on a cast device on the local network.
//!
//! **Architecture:** axum HTTP/SSE front, SQLite queue store, one blocking
//! playout worker speaking CASTV2 to the selected device, and local media
//! acquisition via yt-dlp.

pub mod api;
pub mod cast;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod playback;
pub mod sse;

pub use error::{Error, Result};
