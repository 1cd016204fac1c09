//! WebSocket transport over tokio-tungstenite
//!
//! Adapts a `WebSocketStream` into the text-only `FrameSink`/`FrameStream`
//! pair the manager works with. Binary, ping and pong frames are not part of
//! the relay protocol and are skipped; a close frame ends the stream.

use crate::core::url::RelayUrl;
use crate::error::{RelayError, Result};
use crate::transport::{Connector, FrameSink, FrameStream};
use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

/// Default connector: plain or TLS WebSocket via tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &RelayUrl) -> Result<(FrameSink, FrameStream)> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| RelayError::Transport(format!("failed to connect: {}", e)))?;

        let (write, read) = ws_stream.split();

        let sink_url = url.to_string();
        let sink = write
            .sink_map_err(move |e| RelayError::WriteFailed {
                url: sink_url.clone(),
                reason: e.to_string(),
            })
            .with(|text: String| future::ready(Ok::<_, RelayError>(Message::Text(text))));

        let stream_url = url.clone();
        let stream = read.filter_map(move |msg| {
            let item = match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!("Close frame from {}: {:?}", stream_url, frame);
                    Some(Err(RelayError::Transport("connection closed by relay".to_string())))
                }
                Ok(Message::Binary(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
                Err(e) => Some(Err(RelayError::Transport(e.to_string()))),
            };
            future::ready(item)
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
