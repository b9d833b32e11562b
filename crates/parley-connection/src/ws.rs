// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket relay transport.
//!
//! Carries JSON-encoded [`RelayEvent`] frames over a tokio-tungstenite
//! client connection. The participant id and bearer credential are attached
//! as headers on connect. Unparseable frames are logged and skipped rather
//! than killing the connection.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parley_core::traits::auth::Credentials;
use parley_core::{ParleyError, RelayEvent, RelayTransport};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay transport over a WebSocket connection.
pub struct WsTransport {
    url: String,
    stream: Option<WsStream>,
}

impl WsTransport {
    /// Create a transport for the given `ws://` or `wss://` relay URL.
    /// No connection is opened until [`RelayTransport::connect`].
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
        }
    }

    fn connected_stream(&mut self) -> Result<&mut WsStream, ParleyError> {
        self.stream
            .as_mut()
            .ok_or_else(|| ParleyError::connection("websocket not connected"))
    }
}

#[async_trait]
impl RelayTransport for WsTransport {
    async fn connect(&mut self, credentials: &Credentials) -> Result<(), ParleyError> {
        let mut request =
            self.url
                .as_str()
                .into_client_request()
                .map_err(|e| ParleyError::Connection {
                    message: format!("invalid relay url `{}`", self.url),
                    source: Some(Box::new(e)),
                })?;

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", credentials.token))
            .map_err(|e| ParleyError::Connection {
                message: "credential token is not a valid header value".into(),
                source: Some(Box::new(e)),
            })?;
        let participant_value = HeaderValue::from_str(&credentials.participant_id.0)
            .map_err(|e| ParleyError::Connection {
                message: "participant id is not a valid header value".into(),
                source: Some(Box::new(e)),
            })?;
        request.headers_mut().insert("authorization", auth_value);
        request
            .headers_mut()
            .insert("x-participant-id", participant_value);

        let (stream, response) =
            tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| ParleyError::Connection {
                    message: format!("websocket connect to {} failed", self.url),
                    source: Some(Box::new(e)),
                })?;

        debug!(status = %response.status(), "websocket connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, event: &RelayEvent) -> Result<(), ParleyError> {
        let json = serde_json::to_string(event)
            .map_err(|e| ParleyError::Internal(format!("event serialization failed: {e}")))?;
        let stream = self.connected_stream()?;
        stream
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| ParleyError::Connection {
                message: "websocket send failed".into(),
                source: Some(Box::new(e)),
            })
    }

    async fn receive(&mut self) -> Result<RelayEvent, ParleyError> {
        let stream = self.connected_stream()?;
        loop {
            let frame = stream
                .next()
                .await
                .ok_or_else(|| ParleyError::connection("websocket stream closed"))?
                .map_err(|e| ParleyError::Connection {
                    message: "websocket receive failed".into(),
                    source: Some(Box::new(e)),
                })?;

            match frame {
                Message::Text(text) => match serde_json::from_str::<RelayEvent>(&text) {
                    Ok(event) => return Ok(event),
                    Err(e) => {
                        warn!(error = %e, "skipping unparseable relay frame");
                    }
                },
                Message::Close(_) => {
                    return Err(ParleyError::connection("relay closed the connection"));
                }
                // Binary frames are not part of the protocol; ws-level
                // ping/pong is handled by the tungstenite layer.
                _ => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), ParleyError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
        Ok(())
    }
}
