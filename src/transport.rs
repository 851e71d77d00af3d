//! Connection seam between supervisors and the network.
//!
//! Supervisors only care whether a connection opened, produced a message,
//! closed, or failed. Payloads are never inspected.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::error::{FeedError, FeedResult};
use crate::types::endpoint::Endpoint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Message,
    Closed { reason: Option<String> },
    Error(String),
}

/// Opens connections to endpoints.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Endpoint) -> FeedResult<Box<dyn FeedStream>>;
}

/// An open connection. `next_event` resolves once per observable signal;
/// after `Closed` or `Error` the stream is finished.
#[async_trait]
pub trait FeedStream: Send {
    async fn next_event(&mut self) -> StreamEvent;

    async fn close(&mut self);
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> FeedResult<Box<dyn FeedStream>> {
        let url = Url::parse(&endpoint.address)
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

        let (mut ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| FeedError::WebSocket(e.to_string()))?;

        if let Some(payload) = &endpoint.subscribe {
            ws.send(Message::Text(payload.to_string().into()))
                .await
                .map_err(|e| FeedError::WebSocket(e.to_string()))?;
            debug!(endpoint = %endpoint.id, "Sent subscription frame");
        }

        Ok(Box::new(WsFeedStream {
            inner: ws,
            closed: false,
        }))
    }
}

struct WsFeedStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl FeedStream for WsFeedStream {
    async fn next_event(&mut self) -> StreamEvent {
        if self.closed {
            return StreamEvent::Closed { reason: None };
        }
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => {
                    return StreamEvent::Message
                }
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    return StreamEvent::Closed {
                        reason: frame.map(|f| f.reason.as_str().to_owned()),
                    };
                }
                // Control frames are answered by tungstenite and are not data.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.closed = true;
                    return StreamEvent::Error(e.to_string());
                }
                None => {
                    self.closed = true;
                    return StreamEvent::Closed { reason: None };
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.close(None).await {
            debug!(error = %e, "Close handshake failed");
        }
    }
}
