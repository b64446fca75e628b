//! Update bus: in-process fan-out of queue changes to live SSE viewers
//!
//! Every mutator (enqueue, delete, admin clear, cleanup job, playback worker)
//! calls `publish()`; each connected viewer holds a private unbounded channel
//! so a slow or dead client never blocks the broadcast. Rendering happens
//! once per subscriber per publish because admin and owner views differ.

use axum::response::sse::Event;
use futures::stream::Stream;
use serde_json::json;
use sqlx::{Pool, Sqlite};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::render;
use crate::db::queue;

/// Heartbeat after this much silence keeps proxies and clients from timing
/// out the connection and lets clients detect dead links.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
    username: Option<String>,
    is_admin: bool,
}

/// Fan-out hub for queue-state changes
pub struct UpdateBus {
    db: Pool<Sqlite>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl UpdateBus {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            db,
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of currently connected viewers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Broadcast the current queue state to all connected viewers
    ///
    /// Fetches the queue once, renders per subscriber, and drops only the
    /// subscribers whose channel is gone. Database errors are logged and
    /// swallowed; a failed broadcast must never fail the mutation that
    /// triggered it.
    pub async fn publish(&self) {
        let entries = match queue::list_pending(&self.db).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping queue broadcast, failed to load queue: {}", e);
                return;
            }
        };

        let mut subs = self.subscribers.lock().unwrap();
        let before = subs.len();
        subs.retain(|sub| {
            let html = render::queue_fragment(&entries, sub.username.as_deref(), sub.is_admin);
            sub.tx.send(html).is_ok()
        });
        let dropped = before - subs.len();
        if dropped > 0 {
            debug!("Dropped {} dead SSE subscriber(s) during broadcast", dropped);
        }
    }

    fn register(
        &self,
        username: Option<String>,
        is_admin: bool,
    ) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subscribers.lock().unwrap();
        subs.push(Subscriber {
            id,
            tx,
            username,
            is_admin,
        });
        info!(
            "SSE client connected ({}), total connections: {}",
            id,
            subs.len()
        );
        (id, rx)
    }

    fn deregister(&self, id: u64) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|s| s.id != id);
        info!(
            "SSE client disconnected ({}), total connections: {}",
            id,
            subs.len()
        );
    }

    /// Create the SSE event stream for one viewer connection
    ///
    /// The first event carries the full current queue state; subsequent
    /// events are pushed updates, interleaved with heartbeats during idle
    /// periods. Dropping the stream deregisters the subscriber.
    pub fn event_stream(
        self: &Arc<Self>,
        username: Option<String>,
        is_admin: bool,
    ) -> impl Stream<Item = Result<Event, Infallible>> {
        let bus = Arc::clone(self);
        async_stream::stream! {
            let (id, mut rx) = bus.register(username.clone(), is_admin);
            let _guard = SubscriberGuard { bus: Arc::clone(&bus), id };

            // Initial full queue state for this viewer
            match queue::list_pending(&bus.db).await {
                Ok(entries) => {
                    let html = render::queue_fragment(&entries, username.as_deref(), is_admin);
                    yield Ok(Event::default().event("queue-update").data(html));
                }
                Err(e) => {
                    warn!("Failed to load initial queue state for SSE client: {}", e);
                }
            }

            loop {
                match tokio::time::timeout(HEARTBEAT_INTERVAL, rx.recv()).await {
                    Ok(Some(html)) => {
                        yield Ok(Event::default().event("queue-update").data(html));
                    }
                    // Sender side gone: the bus dropped us during a broadcast
                    Ok(None) => break,
                    Err(_) => {
                        match Event::default().event("heartbeat").json_data(json!({"status": "ok"})) {
                            Ok(event) => yield Ok(event),
                            Err(e) => warn!("Failed to encode heartbeat: {}", e),
                        }
                    }
                }
            }
        }
    }
}

/// Removes the subscriber when the connection stream is dropped, so
/// `publish()` never accumulates dead channels between broadcasts.
struct SubscriberGuard {
    bus: Arc<UpdateBus>,
    id: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.bus.deregister(self.id);
    }
}
