//! Manager actor
//!
//! Owns the desired set, connection table, open attempts, retry timers,
//! health table and subscription table. Commands from `RelayPool` handles and
//! signals from helper tasks (open attempts, read loops, retry timers) are
//! processed one at a time, so the decision of which connections to target is
//! always made against a consistent view. Helper tasks never touch the tables;
//! they only report back through the signal channel, tagged with ids that let
//! the actor discard reports from attempts it has already abandoned.

use crate::core::broadcaster::EventBroadcaster;
use crate::core::codec::ClientMessage;
use crate::core::config::PoolConfig;
use crate::core::connection::{ConnectionSignal, RelayConnection};
use crate::core::event::{Event, Subscription};
use crate::core::health::HealthTracker;
use crate::core::retry::RetryScheduler;
use crate::core::url::RelayUrl;
use crate::error::{RelayError, Result};
use crate::manager::manager::{ManagerCommand, RelaySet};
use crate::transport::{Connector, FrameSink, FrameStream};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// In-flight open of one relay
struct OpenAttempt {
    attempt_id: u64,
    task: JoinHandle<()>,
}

/// A `connect` call waiting for the opens it started
struct PendingConnect {
    waiting: HashSet<RelayUrl>,
    error: Option<RelayError>,
    respond_to: oneshot::Sender<Result<()>>,
}

pub(crate) struct PoolActor {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    broadcaster: Arc<EventBroadcaster>,
    desired: RelaySet,
    connections: HashMap<RelayUrl, RelayConnection>,
    opening: HashMap<RelayUrl, OpenAttempt>,
    retries: RetryScheduler,
    health: HealthTracker,
    subscriptions: HashMap<String, Subscription>,
    pending_connects: Vec<PendingConnect>,
    signals_tx: UnboundedSender<ConnectionSignal>,
    signals_rx: UnboundedReceiver<ConnectionSignal>,
    next_id: u64,
}

impl PoolActor {
    pub(crate) fn new(config: PoolConfig, connector: Arc<dyn Connector>, broadcaster: Arc<EventBroadcaster>) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();

        Self {
            config,
            connector,
            broadcaster,
            desired: HashSet::new(),
            connections: HashMap::new(),
            opening: HashMap::new(),
            retries: RetryScheduler::new(),
            health: HealthTracker::new(),
            subscriptions: HashMap::new(),
            pending_connects: Vec::new(),
            signals_tx,
            signals_rx,
            next_id: 0,
        }
    }

    /// Process commands and signals until every handle is dropped
    pub(crate) async fn run(mut self, mut commands: UnboundedReceiver<ManagerCommand>) {
        debug!("Relay pool actor started");

        loop {
            tokio::select! {
                biased;

                Some(signal) = self.signals_rx.recv() => {
                    self.handle_signal(signal).await;
                }

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        info!("All relay pool handles dropped, shutting down");
        self.disconnect_all().await;
        debug!("Relay pool actor stopped");
    }

    async fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Connect { relays, respond_to } => {
                self.connect(relays, respond_to).await;
            }
            ManagerCommand::Disconnect { respond_to } => {
                self.disconnect_all().await;
                let _ = respond_to.send(());
            }
            ManagerCommand::Publish { event, to, respond_to } => {
                let result = self.publish(event, to).await;
                let _ = respond_to.send(result);
            }
            ManagerCommand::Subscribe {
                subscription,
                on,
                respond_to,
            } => {
                let result = self.subscribe(subscription, on).await;
                let _ = respond_to.send(result);
            }
            ManagerCommand::Unsubscribe { id, on, respond_to } => {
                self.unsubscribe(id, on).await;
                let _ = respond_to.send(());
            }
            ManagerCommand::GetHealth { respond_to } => {
                let _ = respond_to.send(self.health.snapshot());
            }
            ManagerCommand::GetRelayHealth { url, respond_to } => {
                let _ = respond_to.send(self.health.get(&url));
            }
            ManagerCommand::ListConnected { respond_to } => {
                let mut urls: Vec<RelayUrl> = self.connections.keys().cloned().collect();
                urls.sort();
                let _ = respond_to.send(urls);
            }
            ManagerCommand::ListSubscriptions { respond_to } => {
                let mut ids: Vec<String> = self.subscriptions.keys().cloned().collect();
                ids.sort();
                let _ = respond_to.send(ids);
            }
        }
    }

    async fn handle_signal(&mut self, signal: ConnectionSignal) {
        match signal {
            ConnectionSignal::Opened {
                url,
                attempt_id,
                result,
            } => self.handle_opened(url, attempt_id, result).await,
            ConnectionSignal::ReadFailed { url, conn_id, error } => {
                self.handle_failure(&url, conn_id, &error).await;
            }
            ConnectionSignal::RetryDue { url, timer_id } => self.handle_retry_due(url, timer_id),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // ------------------------------------------------------------------
    // Desired set reconciliation
    // ------------------------------------------------------------------

    async fn connect(&mut self, relays: RelaySet, respond_to: oneshot::Sender<Result<()>>) {
        let mut removed: Vec<RelayUrl> = self.desired.difference(&relays).cloned().collect();
        removed.sort();
        for url in &removed {
            self.tear_down(url).await;
            self.health.mark_disconnected(url);
            info!("Relay {} no longer desired", url);
        }

        self.desired = relays;

        let mut added: Vec<RelayUrl> = self
            .desired
            .iter()
            .filter(|url| {
                !self.connections.contains_key(*url)
                    && !self.opening.contains_key(*url)
                    && !self.retries.is_pending(url)
            })
            .cloned()
            .collect();
        added.sort();

        let mut waiting = HashSet::new();
        let mut invalid = None;

        for url in added {
            if let Err(e) = url.validate_scheme() {
                warn!("Not connecting to {}: {}", url, e);
                self.health.mark_failed(&url, &e.to_string());
                invalid.get_or_insert(e);
                continue;
            }

            self.health.mark_connecting(&url);
            self.retries.clear(&url);
            self.start_open(&url);
            waiting.insert(url);
        }

        if waiting.is_empty() {
            let _ = respond_to.send(invalid.map_or(Ok(()), Err));
        } else {
            self.pending_connects.push(PendingConnect {
                waiting,
                error: invalid,
                respond_to,
            });
        }
    }

    /// Stop every activity for a URL without touching its health record
    async fn tear_down(&mut self, url: &RelayUrl) {
        if let Some(attempt) = self.opening.remove(url) {
            attempt.task.abort();
        }
        self.retries.clear(url);
        if let Some(connection) = self.connections.remove(url) {
            connection.close().await;
        }
        self.resolve_pending(url);
    }

    /// Close everything and end the event stream; the actor stays usable
    async fn disconnect_all(&mut self) {
        info!("Disconnecting from all relays");

        self.desired.clear();
        self.subscriptions.clear();

        for (_, attempt) in self.opening.drain() {
            attempt.task.abort();
        }
        self.retries.clear_all();

        let connections: Vec<RelayConnection> = self.connections.drain().map(|(_, c)| c).collect();
        for connection in connections {
            connection.close().await;
        }

        for url in self.health.urls() {
            self.health.mark_disconnected(&url);
        }

        for pending in self.pending_connects.drain(..) {
            let _ = pending.respond_to.send(pending.error.map_or(Ok(()), Err));
        }

        self.broadcaster.close();
    }

    /// Drop `url` from every waiting `connect` call, answering the finished ones
    fn resolve_pending(&mut self, url: &RelayUrl) {
        let mut still_waiting = Vec::with_capacity(self.pending_connects.len());

        for mut pending in self.pending_connects.drain(..) {
            pending.waiting.remove(url);
            if pending.waiting.is_empty() {
                let _ = pending.respond_to.send(pending.error.map_or(Ok(()), Err));
            } else {
                still_waiting.push(pending);
            }
        }

        self.pending_connects = still_waiting;
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Spawn an open attempt that reports back with `ConnectionSignal::Opened`
    fn start_open(&mut self, url: &RelayUrl) {
        let attempt_id = self.next_id();
        let connector = Arc::clone(&self.connector);
        let signals = self.signals_tx.clone();
        let connect_timeout = self.config.get_connect_timeout();
        let open_url = url.clone();

        debug!("Opening connection to {}", url);
        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(connect_timeout, connector.connect(&open_url)).await {
                Ok(result) => result,
                Err(_) => Err(RelayError::Transport(format!(
                    "connect timed out after {:?}",
                    connect_timeout
                ))),
            };
            let _ = signals.send(ConnectionSignal::Opened {
                url: open_url,
                attempt_id,
                result,
            });
        });

        self.opening.insert(url.clone(), OpenAttempt { attempt_id, task });
    }

    async fn handle_opened(&mut self, url: RelayUrl, attempt_id: u64, result: Result<(FrameSink, FrameStream)>) {
        match self.opening.get(&url) {
            Some(attempt) if attempt.attempt_id == attempt_id => {}
            _ => {
                debug!("Discarding abandoned open attempt {} for {}", attempt_id, url);
                return;
            }
        }
        self.opening.remove(&url);

        match result {
            Ok((sink, stream)) => self.on_connected(&url, sink, stream).await,
            Err(e) => {
                let reason = e.to_string();
                warn!("Failed to connect to {}: {}", url, reason);
                self.health.mark_failed(&url, &reason);
                self.schedule_retry(&url, Some(&reason));
            }
        }

        self.resolve_pending(&url);
    }

    async fn on_connected(&mut self, url: &RelayUrl, sink: FrameSink, stream: FrameStream) {
        let conn_id = self.next_id();
        let connection = RelayConnection::start(
            url.clone(),
            conn_id,
            sink,
            stream,
            Arc::clone(&self.broadcaster),
            self.signals_tx.clone(),
            self.config.get_write_timeout(),
        );

        self.retries.clear(url);
        self.health.mark_connected(url);
        self.connections.insert(url.clone(), connection);
        info!("Connected to {}", url);

        self.replay_subscriptions(url, conn_id).await;
    }

    /// Send every standing subscription in scope over a fresh connection
    ///
    /// Stops at the first failed send; the failure is handled like any other
    /// write failure and the next connection replays again.
    async fn replay_subscriptions(&mut self, url: &RelayUrl, conn_id: u64) {
        let mut in_scope: Vec<&Subscription> = self.subscriptions.values().filter(|s| s.targets(url)).collect();
        in_scope.sort_by(|a, b| a.id.cmp(&b.id));

        let Some(connection) = self.connections.get_mut(url) else {
            return;
        };

        let mut failure = None;
        for subscription in in_scope {
            let frame = match (ClientMessage::Req {
                subscription_id: &subscription.id,
                filters: &subscription.filters,
            })
            .encode()
            {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode subscription {}: {}", subscription.id, e);
                    continue;
                }
            };

            connection.add_subscription(&subscription.id);
            if let Err(e) = connection.send(frame).await {
                connection.remove_subscription(&subscription.id);
                failure = Some(e);
                break;
            }
            debug!("Replayed subscription {} on {}", subscription.id, url);
        }

        let active = connection.active_count();
        self.health.set_active_subscriptions(url, active);

        if let Some(e) = failure {
            self.handle_failure(url, conn_id, &e.to_string()).await;
        }
    }

    /// Read or write failure on a live connection
    ///
    /// Reports for a connection that was already replaced are ignored.
    async fn handle_failure(&mut self, url: &RelayUrl, conn_id: u64, reason: &str) {
        match self.connections.get(url) {
            Some(connection) if connection.conn_id() == conn_id => {}
            _ => {
                debug!("Ignoring failure of stale connection {} to {}", conn_id, url);
                return;
            }
        }

        // Dropping aborts the read loop; the transport is already broken
        drop(self.connections.remove(url));

        warn!("Connection to {} failed: {}", url, reason);
        self.health.mark_failed(url, reason);

        if self.desired.contains(url) {
            self.schedule_retry(url, Some(reason));
        }
    }

    fn schedule_retry(&mut self, url: &RelayUrl, reason: Option<&str>) {
        let config = &self.config;
        let (attempt, delay) = self
            .retries
            .schedule(url, |attempt| config.retry_delay(attempt), &self.signals_tx);

        self.health.mark_waiting_retry(url, attempt, delay, reason);
        info!("Retrying {} in {:?} (attempt {})", url, delay, attempt);
    }

    fn handle_retry_due(&mut self, url: RelayUrl, timer_id: u64) {
        if !self.retries.take_due(&url, timer_id) {
            debug!("Ignoring cancelled retry timer {} for {}", timer_id, url);
            return;
        }

        if !self.desired.contains(&url) || self.connections.contains_key(&url) || self.opening.contains_key(&url) {
            return;
        }

        debug!("Retry attempt {} for {}", self.retries.attempt(&url), url);
        self.health.mark_retrying(&url);
        self.start_open(&url);
    }

    // ------------------------------------------------------------------
    // Caller-facing operations
    // ------------------------------------------------------------------

    /// Live connections within `scope` (all live connections when unset), sorted
    fn resolve_targets(&self, scope: Option<&RelaySet>) -> Vec<RelayUrl> {
        let mut targets: Vec<RelayUrl> = self
            .connections
            .keys()
            .filter(|url| scope.map_or(true, |scope| scope.contains(*url)))
            .cloned()
            .collect();
        targets.sort();
        targets
    }

    fn sync_active_counts(&mut self, urls: &[RelayUrl]) {
        for url in urls {
            if let Some(connection) = self.connections.get(url) {
                self.health.set_active_subscriptions(url, connection.active_count());
            }
        }
    }

    /// Send `frame` to each target, collecting failures for handling afterwards
    ///
    /// `on_send` runs before each send and `on_error` after a failed one.
    /// Sends are sequential inside the actor, so a stalled relay delays
    /// other commands by up to the write timeout per target.
    async fn fan_out(
        &mut self,
        targets: &[RelayUrl],
        frame: &str,
        mut on_send: impl FnMut(&mut RelayConnection),
        mut on_error: impl FnMut(&mut RelayConnection),
    ) -> (usize, Vec<(RelayUrl, u64, RelayError)>) {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for url in targets {
            let Some(connection) = self.connections.get_mut(url) else {
                continue;
            };

            on_send(connection);
            match connection.send(frame.to_string()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    on_error(connection);
                    failed.push((url.clone(), connection.conn_id(), e));
                }
            }
        }

        (delivered, failed)
    }

    /// Hand failed connections to recovery; returns the first error
    async fn fail_all(&mut self, failed: Vec<(RelayUrl, u64, RelayError)>) -> Option<RelayError> {
        let mut first = None;
        for (url, conn_id, e) in failed {
            self.handle_failure(&url, conn_id, &e.to_string()).await;
            first.get_or_insert(e);
        }
        first
    }

    async fn publish(&mut self, event: Event, to: Option<RelaySet>) -> Result<()> {
        let targets = self.resolve_targets(to.as_ref());
        if targets.is_empty() {
            return Err(RelayError::NotConnected);
        }

        let frame = ClientMessage::Event(&event).encode().map_err(|e| {
            error!("Failed to encode event {}: {}", event.id, e);
            e
        })?;

        let (delivered, failed) = self.fan_out(&targets, &frame, |_| {}, |_| {}).await;
        let first_error = self.fail_all(failed).await;

        if delivered > 0 {
            debug!("Published event {} to {}/{} relays", event.id, delivered, targets.len());
            Ok(())
        } else {
            Err(first_error.unwrap_or(RelayError::NotConnected))
        }
    }

    async fn subscribe(&mut self, subscription: Subscription, on: Option<RelaySet>) -> Result<()> {
        if subscription.filters.is_empty() {
            return Err(RelayError::SubscriptionFailed(format!(
                "subscription {} has no filters",
                subscription.id
            )));
        }

        let id = subscription.id.clone();
        let record = match on {
            Some(scope) => Subscription {
                target_relays: Some(scope),
                excluded: HashSet::new(),
                ..subscription
            },
            None => subscription,
        };

        let targets: Vec<RelayUrl> = self
            .resolve_targets(None)
            .into_iter()
            .filter(|url| record.targets(url))
            .collect();
        if targets.is_empty() {
            return Err(RelayError::NotConnected);
        }

        let frame = (ClientMessage::Req {
            subscription_id: &record.id,
            filters: &record.filters,
        })
        .encode()
        .map_err(|e| {
            error!("Failed to encode subscription {}: {}", record.id, e);
            e
        })?;

        // A replaced record may have been active on relays outside the new scope
        let out_of_scope: Vec<RelayUrl> = self
            .resolve_targets(None)
            .into_iter()
            .filter(|url| !record.targets(url))
            .filter(|url| {
                self.connections
                    .get(url)
                    .map_or(false, |connection| connection.has_subscription(&id))
            })
            .collect();
        self.subscriptions.insert(id.clone(), record);
        if !out_of_scope.is_empty() {
            self.close_on(&id, &out_of_scope).await;
        }

        let (delivered, failed) = self
            .fan_out(
                &targets,
                &frame,
                |connection| connection.add_subscription(&id),
                |connection| {
                    connection.remove_subscription(&id);
                },
            )
            .await;
        self.sync_active_counts(&targets);
        let first_error = self.fail_all(failed).await;

        if delivered > 0 {
            info!("Subscribed {} on {}/{} relays", id, delivered, targets.len());
            Ok(())
        } else {
            Err(first_error.unwrap_or(RelayError::NotConnected))
        }
    }

    /// Send CLOSE for `id` to `targets`, dropping it from their active sets
    async fn close_on(&mut self, id: &str, targets: &[RelayUrl]) {
        let frame = match (ClientMessage::Close { subscription_id: id }).encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode close for {}: {}", id, e);
                return;
            }
        };

        let (_, failed) = self
            .fan_out(
                targets,
                &frame,
                |connection| {
                    connection.remove_subscription(id);
                },
                |_| {},
            )
            .await;
        self.sync_active_counts(targets);
        self.fail_all(failed).await;
    }

    async fn unsubscribe(&mut self, id: String, on: Option<RelaySet>) {
        if !self.subscriptions.contains_key(&id) {
            debug!("Unsubscribe for unknown subscription {}", id);
            return;
        }

        let targets: Vec<RelayUrl> = self
            .resolve_targets(on.as_ref())
            .into_iter()
            .filter(|url| {
                self.connections
                    .get(url)
                    .map_or(false, |connection| connection.has_subscription(&id))
            })
            .collect();

        self.close_on(&id, &targets).await;

        let Some(removed) = on else {
            self.subscriptions.remove(&id);
            info!("Unsubscribed {} everywhere", id);
            return;
        };

        let still_targeted = match self.subscriptions.get_mut(&id) {
            Some(subscription) => subscription.narrow(&removed),
            None => return,
        };

        if still_targeted {
            debug!("Narrowed scope of subscription {}", id);
        } else {
            self.subscriptions.remove(&id);
            info!("Unsubscribed {} from its last relay", id);
        }
    }
}
