//! Event fan-out
//!
//! Every listener owns an unbounded channel, so a slow listener never causes
//! events to be dropped for the others, and registering or deregistering a
//! listener only takes the registry lock for a map insert/remove.
//!
//! ```text
//! read loop A ──┐                  ┌──> EventStream #1
//! read loop B ──┼──> Broadcaster ──┼──> EventStream #2
//! read loop C ──┘                  └──> EventStream #3
//! ```

use crate::core::event::Event;
use crate::core::url::RelayUrl;
use futures::Stream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// An event delivered on the unified stream
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent {
    /// Relay that delivered the event
    pub relay: RelayUrl,
    /// Subscription the relay matched it against
    pub subscription_id: String,
    pub event: Event,
}

type Registry = RwLock<HashMap<u64, UnboundedSender<ReceivedEvent>>>;

/// Multi-listener broadcaster for received events
#[derive(Debug)]
pub struct EventBroadcaster {
    listeners: Arc<Registry>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a new listener
    ///
    /// The listener receives every event published after this call. Dropping
    /// the returned stream deregisters it.
    pub fn listen(&self) -> EventStream {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.write().insert(id, tx);
        debug!("Registered event listener {}", id);

        EventStream {
            id,
            rx,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    /// Deliver an event to every registered listener
    ///
    /// Returns the number of listeners that received it.
    pub fn publish(&self, event: ReceivedEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let listeners = self.listeners.read();
            for (id, tx) in listeners.iter() {
                match tx.send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut listeners = self.listeners.write();
            for id in closed {
                listeners.remove(&id);
            }
        }

        delivered
    }

    /// End the stream for every current listener
    ///
    /// Listeners drain anything already queued and then observe `None`.
    /// Listeners registered afterwards start a fresh stream.
    pub fn close(&self) {
        let removed = std::mem::take(&mut *self.listeners.write());
        debug!("Closed event stream for {} listeners", removed.len());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener handle on the unified event stream
#[derive(Debug)]
pub struct EventStream {
    id: u64,
    rx: UnboundedReceiver<ReceivedEvent>,
    registry: Weak<Registry>,
}

impl EventStream {
    /// Wait for the next event. `None` means the stream ended.
    pub async fn recv(&mut self) -> Option<ReceivedEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<ReceivedEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = ReceivedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.write().remove(&self.id);
        }
    }
}
