//! Live queue view over Server-Sent Events

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use tracing::debug;

use super::identity::Identity;
use super::server::AppContext;

/// GET /queue/sse - per-viewer event stream
///
/// Emits `queue-update` events rendered for this viewer, interleaved with
/// `heartbeat` events during idle periods. The bus itself drives the
/// heartbeat cadence, so no extra keep-alive layer is needed here.
pub async fn queue_events(
    State(ctx): State<AppContext>,
    identity: Identity,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(
        "New SSE client (user: {:?}, admin: {})",
        identity.username, identity.is_admin
    );
    let stream = ctx.bus.event_stream(identity.username, identity.is_admin);
    Sse::new(stream)
}
