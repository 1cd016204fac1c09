//! # RelayPool
//!
//! Connection manager for a set of interchangeable publish/subscribe relays
//! speaking the JSON-array wire protocol over WebSocket.
//!
//! ## Features
//!
//! - **Serialized ownership**: one actor task owns the connection, retry,
//!   health and subscription tables; callers talk to it through a handle
//! - **Automatic recovery**: failed relays are retried with capped exponential
//!   backoff and standing subscriptions are replayed on every reconnect
//! - **Unified stream**: events from every relay are fanned out to any number
//!   of dynamically registered listeners
//! - **Health snapshots**: per-relay status records for diagnostics UIs
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaypool::{Filter, RelayPool, Subscription};
//!
//! let pool = RelayPool::new();
//! let mut events = pool.listen();
//!
//! pool.connect(["wss://relay.damus.io", "wss://nos.lol"]).await?;
//! pool.subscribe(Subscription::new(vec![Filter::new().kinds(vec![1]).limit(20)]), None).await?;
//!
//! while let Some(received) = events.recv().await {
//!     println!("{} from {}", received.event.id, received.relay);
//! }
//! ```

pub mod core;
pub mod manager;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    broadcaster::{EventBroadcaster, EventStream, ReceivedEvent},
    codec::{decode_frame, ClientMessage, RelayMessage},
    config::PoolConfig,
    event::{generate_subscription_id, Event, Filter, Subscription},
    health::{RelayHealth, RelayStatus},
    transport::TungsteniteConnector,
    url::{RelayEndpoint, RelayUrl},
};

// Re-export manager
pub use manager::RelayPool;

/// Type alias for Result with RelayError
pub type Result<T> = std::result::Result<T, traits::RelayError>;
