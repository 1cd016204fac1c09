//! # RelayPool Core
//!
//! Building blocks owned and driven by the manager actor:
//!
//! - **url / event**: relay addresses, signed events, filters, subscriptions
//! - **codec**: JSON-array wire messages
//! - **transport**: tokio-tungstenite implementation of `Connector`
//! - **connection**: one live connection and its read loop
//! - **retry**: per-relay backoff timers
//! - **health**: per-relay status records
//! - **broadcaster**: fan-out of received events to listeners

pub mod broadcaster;
pub mod codec;
pub mod config;
pub mod connection;
pub mod event;
pub mod health;
pub mod retry;
pub mod transport;
pub mod url;

pub use broadcaster::{EventBroadcaster, EventStream, ReceivedEvent};
pub use codec::{decode_frame, ClientMessage, RelayMessage};
pub use config::PoolConfig;
pub use event::{generate_subscription_id, Event, Filter, Subscription};
pub use health::{HealthTracker, RelayHealth, RelayStatus};
pub use transport::TungsteniteConnector;
pub use self::url::{RelayEndpoint, RelayUrl};
