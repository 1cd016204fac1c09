//! Common test utilities for RelayPool integration tests
//!
//! - `MockRelay`: a real WebSocket relay on localhost that records frames
//! - `MemoryConnector`: an in-memory `Connector` for deterministic failure
//!   injection under paused tokio time

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relaypool::{Connector, Event, FrameSink, FrameStream, RelayError, RelayUrl, Result};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Poll `check` every 10ms until it holds or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll a synchronous condition every 10ms until it holds or `timeout` elapses
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    eventually(timeout, || std::future::ready(check())).await
}

/// A signed-looking event for tests; relays never verify signatures here
pub fn sample_event(id: &str) -> Event {
    Event {
        id: id.to_string(),
        pubkey: "a".repeat(64),
        created_at: 1_700_000_000,
        kind: 1,
        tags: vec![vec!["t".to_string(), "test".to_string()]],
        content: format!("content of {}", id),
        sig: "b".repeat(128),
    }
}

/// `["EVENT", <sub_id>, <event>]` as a relay would send it
pub fn event_frame(subscription_id: &str, event: &Event) -> String {
    serde_json::json!(["EVENT", subscription_id, event]).to_string()
}

/// A URL nothing listens on
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}

enum Outgoing {
    Text(String),
    /// An event published by some client, for every open subscription
    Publish(serde_json::Value),
    Drop,
}

/// A mock relay speaking WebSocket on localhost
///
/// Records every text frame received from any client, can push frames to
/// every connected client, and can drop connections abruptly. Published
/// events are forwarded to every open subscription of every client without
/// filter matching.
pub struct MockRelay {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    clients: Arc<Mutex<Vec<mpsc::UnboundedSender<Outgoing>>>>,
    accepted: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
}

impl MockRelay {
    /// Create and start a new mock relay
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let relay = Self {
            addr,
            received: Arc::new(Mutex::new(Vec::new())),
            clients: Arc::new(Mutex::new(Vec::new())),
            accepted: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(Notify::new()),
        };

        let received = relay.received.clone();
        let clients = relay.clients.clone();
        let accepted = relay.accepted.clone();
        let active = relay.active.clone();
        let shutdown = relay.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let (tx, rx) = mpsc::unbounded_channel();
                                clients.lock().push(tx);
                                accepted.fetch_add(1, Ordering::SeqCst);
                                tokio::spawn(Self::handle_connection(
                                    stream,
                                    rx,
                                    clients.clone(),
                                    received.clone(),
                                    active.clone(),
                                    shutdown.clone(),
                                ));
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        relay
    }

    async fn handle_connection(
        stream: TcpStream,
        mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
        clients: Arc<Mutex<Vec<mpsc::UnboundedSender<Outgoing>>>>,
        received: Arc<Mutex<Vec<String>>>,
        active: Arc<AtomicUsize>,
        shutdown: Arc<Notify>,
    ) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        active.fetch_add(1, Ordering::SeqCst);
        let (mut write, mut read) = ws_stream.split();
        let mut subscriptions: Vec<String> = Vec::new();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_client_message(&text, &mut subscriptions, &clients);
                            received.lock().push(text);
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                out = outgoing.recv() => {
                    match out {
                        Some(Outgoing::Text(text)) => {
                            if write.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(Outgoing::Publish(event)) => {
                            for id in &subscriptions {
                                let frame = serde_json::json!(["EVENT", id, event]).to_string();
                                if write.send(Message::Text(frame)).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Outgoing::Drop) | None => break,
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }

        active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Track REQ/CLOSE per connection and forward published events
    fn handle_client_message(
        text: &str,
        subscriptions: &mut Vec<String>,
        clients: &Mutex<Vec<mpsc::UnboundedSender<Outgoing>>>,
    ) {
        let Ok(serde_json::Value::Array(message)) = serde_json::from_str::<serde_json::Value>(text) else {
            return;
        };

        match (message.first().and_then(|v| v.as_str()), message.get(1)) {
            (Some("REQ"), Some(serde_json::Value::String(id))) => {
                subscriptions.retain(|existing| existing != id);
                subscriptions.push(id.clone());
            }
            (Some("CLOSE"), Some(serde_json::Value::String(id))) => {
                subscriptions.retain(|existing| existing != id);
            }
            (Some("EVENT"), Some(event)) => {
                clients
                    .lock()
                    .retain(|client| client.send(Outgoing::Publish(event.clone())).is_ok());
            }
            _ => {}
        }
    }

    /// Get the WebSocket URL for this relay
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn relay_url(&self) -> RelayUrl {
        RelayUrl::new(self.url())
    }

    /// Every text frame received so far
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Received frames of one message type (`"REQ"`, `"CLOSE"`, `"EVENT"`)
    pub fn received_of(&self, msg_type: &str) -> Vec<String> {
        let prefix = format!("[\"{}\"", msg_type);
        self.received()
            .into_iter()
            .filter(|frame| frame.starts_with(&prefix))
            .collect()
    }

    /// Send a text frame to every connected client
    pub fn push(&self, text: impl Into<String>) {
        let text = text.into();
        self.clients
            .lock()
            .retain(|client| client.send(Outgoing::Text(text.clone())).is_ok());
    }

    /// Abruptly drop every client connection (no close frame)
    pub fn drop_clients(&self) {
        for client in self.clients.lock().drain(..) {
            let _ = client.send(Outgoing::Drop);
        }
    }

    /// Number of WebSocket connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Number of WebSocket connections currently open
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Shutdown the relay
    pub fn shutdown(&self) {
        self.drop_clients();
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Default)]
struct MemoryState {
    attempts: HashMap<RelayUrl, usize>,
    refusing: HashSet<RelayUrl>,
    hanging: HashSet<RelayUrl>,
    failing_writes: HashSet<RelayUrl>,
    stalling_close: HashSet<RelayUrl>,
    sent: HashMap<RelayUrl, Vec<String>>,
    links: HashMap<RelayUrl, futures::channel::mpsc::UnboundedSender<Result<String>>>,
}

/// In-memory connector with scripted failures
///
/// Clones share state, so a test keeps one clone to drive relays while the
/// pool owns another.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (or stop refusing) every open attempt for `url`
    pub fn set_refusing(&self, url: &str, refusing: bool) {
        let url = RelayUrl::new(url);
        let mut state = self.state.lock();
        if refusing {
            state.refusing.insert(url);
        } else {
            state.refusing.remove(&url);
        }
    }

    /// Open attempts for `url` never complete
    pub fn set_hanging(&self, url: &str) {
        self.state.lock().hanging.insert(RelayUrl::new(url));
    }

    /// Make every write to `url` fail
    pub fn set_failing_writes(&self, url: &str, failing: bool) {
        let url = RelayUrl::new(url);
        let mut state = self.state.lock();
        if failing {
            state.failing_writes.insert(url);
        } else {
            state.failing_writes.remove(&url);
        }
    }

    /// Connections to `url` never finish their close handshake
    pub fn set_stalling_close(&self, url: &str) {
        self.state.lock().stalling_close.insert(RelayUrl::new(url));
    }

    pub fn attempts(&self, url: &str) -> usize {
        self.state.lock().attempts.get(&RelayUrl::new(url)).copied().unwrap_or(0)
    }

    /// Frames written to `url` across all of its connections
    pub fn sent(&self, url: &str) -> Vec<String> {
        self.state.lock().sent.get(&RelayUrl::new(url)).cloned().unwrap_or_default()
    }

    pub fn sent_of(&self, url: &str, msg_type: &str) -> Vec<String> {
        let prefix = format!("[\"{}\"", msg_type);
        self.sent(url)
            .into_iter()
            .filter(|frame| frame.starts_with(&prefix))
            .collect()
    }

    /// Deliver a frame on the current connection to `url`
    pub fn push(&self, url: &str, frame: impl Into<String>) -> bool {
        let state = self.state.lock();
        match state.links.get(&RelayUrl::new(url)) {
            Some(link) => link.unbounded_send(Ok(frame.into())).is_ok(),
            None => false,
        }
    }

    /// End the current connection to `url` as if the relay went away
    pub fn sever(&self, url: &str) {
        self.state.lock().links.remove(&RelayUrl::new(url));
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &RelayUrl) -> Result<(FrameSink, FrameStream)> {
        let (hanging, stalling_close) = {
            let mut state = self.state.lock();
            *state.attempts.entry(url.clone()).or_insert(0) += 1;
            if state.refusing.contains(url) {
                return Err(RelayError::Transport("connection refused".to_string()));
            }
            (state.hanging.contains(url), state.stalling_close.contains(url))
        };

        if hanging {
            futures::future::pending::<()>().await;
        }

        let (tx, rx) = futures::channel::mpsc::unbounded();
        self.state.lock().links.insert(url.clone(), tx);

        let state = self.state.clone();
        let sink_url = url.clone();
        let sink = futures::sink::unfold((), move |(), frame: String| {
            let state = state.clone();
            let url = sink_url.clone();
            async move {
                let mut state = state.lock();
                if state.failing_writes.contains(&url) {
                    return Err(RelayError::WriteFailed {
                        url: url.to_string(),
                        reason: "broken pipe".to_string(),
                    });
                }
                state.sent.entry(url).or_default().push(frame);
                Ok(())
            }
        });

        let sink: FrameSink = Box::pin(sink);
        let sink: FrameSink = if stalling_close {
            Box::pin(StallingClose { inner: sink })
        } else {
            sink
        };

        Ok((sink, Box::pin(rx)))
    }
}

/// Sink wrapper whose close never completes
struct StallingClose {
    inner: FrameSink,
}

impl futures::Sink<String> for StallingClose {
    type Error = RelayError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.as_mut().poll_ready(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: String) -> Result<()> {
        self.inner.as_mut().start_send(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Pending
    }
}
