//! Websocket transport abstraction.
//!
//! The link manager only needs to open a connection, send text frames, read
//! the next application frame and close. [`Connector`] and [`Transport`]
//! capture exactly that, with a tokio-tungstenite implementation for real
//! connections.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::trace;

use crate::error::{LinkError, Result};

/// Application-level event read from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A data frame, payload treated as an opaque string
    Frame(String),
    /// The peer sent a close frame
    Closed { code: Option<u16>, reason: String },
}

/// An open, exclusively owned websocket connection.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Wait for the next data frame or close notification.
    ///
    /// Control frames (ping/pong) are handled internally and never surface.
    async fn next_event(&mut self) -> Result<TransportEvent>;

    /// Close the connection from the client side.
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports to a websocket endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport + 'static;

    async fn connect(&self, url: &str) -> Result<Self::Transport>;
}

/// Connector backed by tokio-tungstenite over rustls.
#[derive(Clone)]
pub struct TungsteniteConnector {
    tls: Arc<ClientConfig>,
}

impl TungsteniteConnector {
    pub fn new(tls: Arc<ClientConfig>) -> Self {
        Self { tls }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    type Transport = TungsteniteTransport;

    async fn connect(&self, url: &str) -> Result<Self::Transport> {
        let connector = tokio_tungstenite::Connector::Rustls(self.tls.clone());
        let (stream, response) =
            connect_async_tls_with_config(url, None, false, Some(connector)).await?;
        trace!(status = %response.status(), "Websocket upgrade completed");
        Ok(TungsteniteTransport { stream })
    }
}

pub struct TungsteniteTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::text(text.to_owned())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<TransportEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(TransportEvent::Frame(
                        String::from_utf8_lossy(&data).into_owned(),
                    ));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (
                            Some(u16::from(frame.code)),
                            frame.reason.as_str().to_owned(),
                        ),
                        None => (None, String::new()),
                    };
                    return Ok(TransportEvent::Closed { code, reason });
                }
                // ping/pong are answered by tungstenite on the next read
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(LinkError::TransportClosed),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(e) => match LinkError::from(e) {
                LinkError::TransportClosed => Ok(()),
                other => Err(other),
            },
        }
    }
}
