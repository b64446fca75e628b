//! HTTP surface: routing, request handlers, identity resolution, SSE

pub mod handlers;
pub mod identity;
pub mod server;
pub mod sse;

pub use server::AppContext;
