//! Persistent notification channel transport.
//!
//! One WebSocket connection per channel, carrying JSON-encoded push events.
//! The listener owns reconnection; this layer only dials and decodes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::trace;
use url::Url;

use crate::sync::{ChannelKind, PushEvent};

use super::error::TransportError;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<PushEvent, TransportError>> + Send>>;

/// Dials a notification channel and yields its event stream.
///
/// Implemented over WebSocket in production; tests substitute an in-memory
/// transport.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(
        &self,
        channel: ChannelKind,
        token: &str,
    ) -> Result<EventStream, TransportError>;
}

/// WebSocket-backed channel transport.
pub struct WsChannelTransport {
    endpoint: Url,
}

impl WsChannelTransport {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    /// Endpoint with `channel` and `access_token` query parameters.
    fn build_url(&self, channel: ChannelKind, token: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("channel", channel.as_str())
            .append_pair("access_token", token);
        url
    }
}

#[async_trait]
impl ChannelTransport for WsChannelTransport {
    async fn connect(
        &self,
        channel: ChannelKind,
        token: &str,
    ) -> Result<EventStream, TransportError> {
        let url = self.build_url(channel, token);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        // listen-only connection, the write half is dropped
        let (_, read) = ws_stream.split();

        let events = read.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(
                    serde_json::from_str::<PushEvent>(&text)
                        .map_err(|e| TransportError::Decode(e.to_string())),
                ),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    trace!("channel keepalive");
                    None
                }
                Ok(Message::Close(_)) => {
                    Some(Err(TransportError::Stream("closed by server".into())))
                }
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Stream(e.to_string()))),
            }
        });

        Ok(Box::pin(events))
    }
}
