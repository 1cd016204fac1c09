//! # RelayPool Traits
//!
//! Error type and the pluggable seams of the connection manager:
//!
//! - **RetryPolicy**: delay before the next reconnection attempt
//! - **Connector**: how a transport connection to a relay is opened

pub mod error;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{RelayError, Result};
pub use reconnect::{ExponentialBackoff, FixedDelay, RetryPolicy};
pub use transport::{Connector, FrameSink, FrameStream};
