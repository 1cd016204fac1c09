use crate::core::broadcaster::{EventBroadcaster, EventStream};
use crate::core::config::PoolConfig;
use crate::core::event::{Event, Subscription};
use crate::core::health::RelayHealth;
use crate::core::transport::TungsteniteConnector;
use crate::core::url::RelayUrl;
use crate::manager::actor::PoolActor;
use crate::traits::{Connector, RelayError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Set of relay URLs accepted by scoped operations
pub type RelaySet = HashSet<RelayUrl>;

/// Command processed by the manager actor
#[derive(Debug)]
pub enum ManagerCommand {
    /// Replace the desired relay set
    Connect {
        relays: RelaySet,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// Drop every relay and end the event stream
    Disconnect { respond_to: oneshot::Sender<()> },
    /// Send an event to some or all live relays
    Publish {
        event: Event,
        to: Option<RelaySet>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// Register a standing subscription
    Subscribe {
        subscription: Subscription,
        on: Option<RelaySet>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// Remove a subscription everywhere or from some relays
    Unsubscribe {
        id: String,
        on: Option<RelaySet>,
        respond_to: oneshot::Sender<()>,
    },
    /// Snapshot of every health record
    GetHealth {
        respond_to: oneshot::Sender<Vec<RelayHealth>>,
    },
    /// Health record of a single relay
    GetRelayHealth {
        url: RelayUrl,
        respond_to: oneshot::Sender<Option<RelayHealth>>,
    },
    /// URLs with a live connection
    ListConnected {
        respond_to: oneshot::Sender<Vec<RelayUrl>>,
    },
    /// Ids of standing subscriptions
    ListSubscriptions {
        respond_to: oneshot::Sender<Vec<String>>,
    },
}

/// Manager for a set of relay connections
///
/// Provides centralized control over many relay connections: reconciling
/// the desired relay set, publishing, standing subscriptions that survive
/// reconnects, per-relay health, and one unified stream of received events.
///
/// Must be created inside a Tokio runtime. The actor stops (closing every
/// connection) once the last clone of the handle is dropped.
///
/// # Example
/// ```ignore
/// let pool = RelayPool::new();
/// let mut events = pool.listen();
///
/// pool.connect(["wss://relay.damus.io", "wss://nos.lol"]).await?;
/// pool.subscribe(Subscription::new(vec![Filter::new().kinds(vec![1])]), None).await?;
/// pool.publish(signed_event, None).await?;
/// ```
#[derive(Clone)]
pub struct RelayPool {
    commands: mpsc::UnboundedSender<ManagerCommand>,
    broadcaster: Arc<EventBroadcaster>,
}

impl RelayPool {
    /// Create a pool with default configuration and the WebSocket connector
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self::with_connector(config, TungsteniteConnector)
    }

    /// Create a pool that opens connections through a custom connector
    pub fn with_connector(config: PoolConfig, connector: impl Connector) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let broadcaster = Arc::new(EventBroadcaster::new());

        let actor = PoolActor::new(config, Arc::new(connector), Arc::clone(&broadcaster));
        tokio::spawn(actor.run(command_rx));

        Self {
            commands,
            broadcaster,
        }
    }

    /// Register a listener on the unified event stream
    ///
    /// Dropping the returned stream deregisters the listener.
    pub fn listen(&self) -> EventStream {
        self.broadcaster.listen()
    }

    /// Number of currently registered listeners
    pub fn listener_count(&self) -> usize {
        self.broadcaster.listener_count()
    }

    /// Set the desired relay set
    ///
    /// Relays no longer desired are closed, newly desired relays are opened.
    /// Returns once every relay opened by this call has connected or had a
    /// retry scheduled. Open failures are retried in the background and are
    /// not returned here.
    ///
    /// # Returns
    /// * `Ok(())` - Reconciliation finished
    /// * `Err(RelayError::RelayUrlInvalid)` - At least one URL does not use a
    ///   WebSocket scheme; it is never attempted, the others proceed normally
    pub async fn connect<I, U>(&self, relays: I) -> Result<()>
    where
        I: IntoIterator<Item = U>,
        U: Into<RelayUrl>,
    {
        let relays = relays.into_iter().map(Into::into).collect();
        self.request(|respond_to| ManagerCommand::Connect { relays, respond_to })
            .await?
    }

    /// Close every connection, cancel every retry and end the event stream
    ///
    /// The pool stays usable; a later `connect` starts over.
    pub async fn disconnect(&self) {
        let _ = self
            .request(|respond_to| ManagerCommand::Disconnect { respond_to })
            .await;
    }

    /// Publish a signed event
    ///
    /// Sends to `to` (restricted to live connections) or to every live
    /// connection. A failing relay is handed to reconnection and does not
    /// stop delivery to the others.
    ///
    /// # Returns
    /// * `Ok(())` - At least one relay accepted the frame
    /// * `Err(RelayError::NotConnected)` - No live target
    /// * `Err(RelayError::WriteFailed)` - Every target failed
    pub async fn publish(&self, event: Event, to: Option<RelaySet>) -> Result<()> {
        self.request(|respond_to| ManagerCommand::Publish { event, to, respond_to })
            .await?
    }

    /// Register a standing subscription
    ///
    /// The scope is `on`, falling back to `subscription.target_relays`; an
    /// unset scope means every relay. The subscription is replayed on every
    /// relay in scope whenever it (re)connects.
    ///
    /// # Returns
    /// * `Err(RelayError::SubscriptionFailed)` - Empty filter list
    /// * `Err(RelayError::NotConnected)` - No live relay in scope right now;
    ///   nothing is recorded
    /// * `Err(RelayError::WriteFailed)` - Recorded, but every live target
    ///   failed; those relays reconnect and replay it
    pub async fn subscribe(&self, subscription: Subscription, on: Option<RelaySet>) -> Result<()> {
        self.request(|respond_to| ManagerCommand::Subscribe {
            subscription,
            on,
            respond_to,
        })
        .await?
    }

    /// Remove a subscription
    ///
    /// Without `on` the subscription is removed everywhere. With `on` the
    /// given relays stop being targeted: an explicit scope loses them and the
    /// record is removed once it is empty, while an unscoped subscription
    /// excludes them and keeps reaching relays desired later. Unknown ids are
    /// ignored.
    pub async fn unsubscribe(&self, id: impl Into<String>, on: Option<RelaySet>) -> Result<()> {
        let id = id.into();
        self.request(|respond_to| ManagerCommand::Unsubscribe { id, on, respond_to })
            .await
    }

    /// Health records for every relay that has ever been desired, sorted by URL
    pub async fn health(&self) -> Vec<RelayHealth> {
        self.request(|respond_to| ManagerCommand::GetHealth { respond_to })
            .await
            .unwrap_or_default()
    }

    pub async fn relay_health(&self, url: impl Into<RelayUrl>) -> Option<RelayHealth> {
        let url = url.into();
        self.request(|respond_to| ManagerCommand::GetRelayHealth { url, respond_to })
            .await
            .ok()
            .flatten()
    }

    /// URLs with a live connection, sorted
    pub async fn connected_relays(&self) -> Vec<RelayUrl> {
        self.request(|respond_to| ManagerCommand::ListConnected { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Ids of standing subscriptions, sorted
    pub async fn subscriptions(&self) -> Vec<String> {
        self.request(|respond_to| ManagerCommand::ListSubscriptions { respond_to })
            .await
            .unwrap_or_default()
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ManagerCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| RelayError::NotConnected)?;
        rx.await.map_err(|_| RelayError::NotConnected)
    }
}

impl Default for RelayPool {
    fn default() -> Self {
        Self::new()
    }
}
