//! One live transport connection to one relay
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   frames    ┌────────────┐   events   ┌─────────────┐
//! │ FrameStream      │ ──────────> │ read loop  │ ─────────> │ Broadcaster │
//! └──────────────────┘             │ (spawned)  │            └─────────────┘
//!                                  └─────┬──────┘
//!                                        │ ReadFailed (never on abort)
//!                                        v
//!                                  manager actor
//! ```
//!
//! The manager owns the `RelayConnection` and writes through its sink
//! directly. A connection is never reused: a reconnect builds a new one with
//! a new `conn_id`, so late signals from an old read loop are recognized as
//! stale and ignored.

use crate::core::broadcaster::{EventBroadcaster, ReceivedEvent};
use crate::core::codec::{decode_frame, RelayMessage};
use crate::core::url::RelayUrl;
use crate::error::{RelayError, Result};
use crate::transport::{FrameSink, FrameStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on the close handshake, which runs inside the manager actor
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Signals fed back into the manager actor by its helper tasks
pub(crate) enum ConnectionSignal {
    /// An open attempt finished
    Opened {
        url: RelayUrl,
        attempt_id: u64,
        result: Result<(FrameSink, FrameStream)>,
    },
    /// A read loop hit a transport error or the relay closed the socket
    ReadFailed {
        url: RelayUrl,
        conn_id: u64,
        error: String,
    },
    /// A retry timer fired
    RetryDue { url: RelayUrl, timer_id: u64 },
}

/// Live connection to a single relay
pub(crate) struct RelayConnection {
    url: RelayUrl,
    conn_id: u64,
    sink: FrameSink,
    read_task: JoinHandle<()>,
    active_subscriptions: HashSet<String>,
    write_timeout: Duration,
}

impl RelayConnection {
    /// Take ownership of an opened transport and spawn its read loop
    pub(crate) fn start(
        url: RelayUrl,
        conn_id: u64,
        sink: FrameSink,
        stream: FrameStream,
        broadcaster: Arc<EventBroadcaster>,
        signals: UnboundedSender<ConnectionSignal>,
        write_timeout: Duration,
    ) -> Self {
        let read_task = tokio::spawn(read_loop(url.clone(), conn_id, stream, broadcaster, signals));

        Self {
            url,
            conn_id,
            sink,
            read_task,
            active_subscriptions: HashSet::new(),
            write_timeout,
        }
    }

    pub(crate) fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Send one encoded frame
    ///
    /// # Returns
    /// * `Ok(())` - Frame handed to the transport
    /// * `Err(RelayError::WriteFailed)` - Transport error or write timeout
    pub(crate) async fn send(&mut self, frame: String) -> Result<()> {
        match tokio::time::timeout(self.write_timeout, self.sink.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(RelayError::WriteFailed { url, reason })) => Err(RelayError::WriteFailed { url, reason }),
            Ok(Err(e)) => Err(RelayError::WriteFailed {
                url: self.url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RelayError::WriteFailed {
                url: self.url.to_string(),
                reason: format!("write timed out after {:?}", self.write_timeout),
            }),
        }
    }

    pub(crate) fn add_subscription(&mut self, id: &str) {
        self.active_subscriptions.insert(id.to_string());
    }

    pub(crate) fn remove_subscription(&mut self, id: &str) -> bool {
        self.active_subscriptions.remove(id)
    }

    pub(crate) fn has_subscription(&self, id: &str) -> bool {
        self.active_subscriptions.contains(id)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active_subscriptions.len()
    }

    /// Cancel the read loop and close the transport
    ///
    /// The aborted read loop never reports a failure for this connection.
    pub(crate) async fn close(mut self) {
        self.read_task.abort();
        let limit = self.write_timeout.min(CLOSE_TIMEOUT);
        if tokio::time::timeout(limit, self.sink.close()).await.is_err() {
            debug!("Timed out closing connection to {}", self.url);
        }
        info!("Closed connection to {}", self.url);
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

/// Receive frames until the transport fails or ends
async fn read_loop(
    url: RelayUrl,
    conn_id: u64,
    mut stream: FrameStream,
    broadcaster: Arc<EventBroadcaster>,
    signals: UnboundedSender<ConnectionSignal>,
) {
    let error = loop {
        match stream.next().await {
            Some(Ok(frame)) => {
                handle_frame(&url, &frame, &broadcaster);
            }
            Some(Err(e)) => break e.to_string(),
            None => break "connection closed".to_string(),
        }
    };

    warn!("Read loop for {} ended: {}", url, error);
    let _ = signals.send(ConnectionSignal::ReadFailed { url, conn_id, error });
}

/// Decode every message in a frame and dispatch it
///
/// Malformed or unrecognized messages are logged and dropped; they never end
/// the read loop.
pub(crate) fn handle_frame(url: &RelayUrl, frame: &str, broadcaster: &EventBroadcaster) -> usize {
    let mut delivered = 0;

    for message in decode_frame(frame) {
        match message {
            Ok(RelayMessage::Event {
                subscription_id,
                event,
            }) => {
                broadcaster.publish(ReceivedEvent {
                    relay: url.clone(),
                    subscription_id,
                    event,
                });
                delivered += 1;
            }
            Ok(RelayMessage::Notice { message }) => {
                warn!("NOTICE from {}: {}", url, message);
            }
            Ok(RelayMessage::Eose { subscription_id }) => {
                debug!("EOSE from {} for {}", url, subscription_id);
            }
            Err(e) => {
                debug!("Dropping message from {}: {}", url, e);
            }
        }
    }

    delivered
}
