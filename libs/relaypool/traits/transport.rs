use crate::core::url::RelayUrl;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use futures::{Sink, Stream};
use std::pin::Pin;

/// Outgoing half of a relay transport. Accepts encoded text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = RelayError> + Send>>;

/// Incoming half of a relay transport. Yields text frames until the
/// connection ends; an `Err` item means the transport failed.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for opening transport connections to relays
///
/// The manager calls this for every connection attempt, including
/// reconnections. The URL scheme has already been validated.
///
/// # Example
/// ```ignore
/// struct LoopbackConnector;
///
/// #[async_trait::async_trait]
/// impl Connector for LoopbackConnector {
///     async fn connect(&self, url: &RelayUrl) -> Result<(FrameSink, FrameStream)> {
///         // Build sink/stream halves from in-memory channels
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection and return its outgoing and incoming halves
    async fn connect(&self, url: &RelayUrl) -> Result<(FrameSink, FrameStream)>;
}
