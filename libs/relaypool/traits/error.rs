use thiserror::Error;

/// Main error type for relaypool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// URL does not use a WebSocket scheme; the connection is never attempted
    #[error("Invalid relay URL: {0}")]
    RelayUrlInvalid(String),

    /// The operation resolved to zero live relay connections
    #[error("Not connected to any target relay")]
    NotConnected,

    /// Sending a frame to a relay failed
    #[error("Write to {url} failed: {reason}")]
    WriteFailed { url: String, reason: String },

    /// Subscription request rejected before touching any connection
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    /// A wire message could not be encoded or decoded
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Transport-level open or receive error. Only recorded in relay health,
    /// never returned from a caller-facing operation.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::DecodeFailed(err.to_string())
    }
}

/// Result type for relaypool operations
pub type Result<T> = std::result::Result<T, RelayError>;
