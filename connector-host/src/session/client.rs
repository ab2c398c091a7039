//! Outbound WebSocket session: connects to the orchestrator, authenticates
//! with a client-credentials bearer token, and serves `ping` /
//! `list-connectors` / `operation` frames until shut down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::Notify;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, frame::coding::CloseCode};
use tokio_tungstenite::tungstenite::Message;

use crate::config::SessionConfig;
use crate::error::{Error, Result, WireError};
use crate::registry::Registry;
use crate::session::dispatch::dispatch;
use crate::session::frames::{InboundFrame, OutboundFrame};
use crate::session::token::TokenProvider;

/// Drives one reconnecting WebSocket session for the lifetime of the
/// process. `run` never returns until `shutdown` is called.
pub struct SessionClient {
    config: SessionConfig,
    registry: Registry,
    token_provider: Arc<TokenProvider>,
    reconnect: Notify,
    shutting_down: AtomicBool,
}

impl SessionClient {
    pub fn new(config: SessionConfig, registry: Registry) -> Result<Arc<Self>> {
        let token_provider = TokenProvider::new(&config)?;
        Ok(Arc::new(Self {
            config,
            registry,
            token_provider,
            reconnect: Notify::new(),
            shutting_down: AtomicBool::new(false),
        }))
    }

    /// Connects, serves frames until the socket drops, then reconnects
    /// with exponential backoff (1,000ms doubling to a 30,000ms cap).
    /// At most one reconnect is ever scheduled at a time; `shutdown()`
    /// cancels a pending wait and prevents a further attempt.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = self.config.initial_backoff();
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }

            match self.connect_and_serve().await {
                Ok(()) => {
                    tracing::info!("websocket session closed normally");
                    backoff = self.config.initial_backoff();
                }
                Err(err) => {
                    tracing::warn!(error = %err, "websocket session ended, will retry");
                    if matches!(err, Error::Unauthorized(_) | Error::TokenRequestFailed { .. }) {
                        self.token_provider.invalidate().await;
                    }
                }
            }

            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.reconnect.notified() => return,
            }
            backoff = (backoff * 2).min(self.config.max_backoff());
        }
    }

    /// Cancels any pending reconnect and stops `run` from trying again.
    /// Does not close an in-flight socket directly; the next read loop
    /// iteration observes `shutting_down` and closes with code 1000.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.reconnect.notify_waiters();
    }

    async fn connect_and_serve(&self) -> Result<()> {
        let token = self.token_provider.token().await?;

        let mut request = self
            .config
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::ProtocolError(format!("invalid websocket url: {e}")))?;
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::ProtocolError(format!("invalid bearer token: {e}")))?,
        );

        let ws_stream = match connect_async(request).await {
            Ok((stream, _response)) => stream,
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                let status = response.status();
                if status.as_u16() == 401 || status.as_u16() == 403 {
                    return Err(Error::Unauthorized(format!("websocket upgrade rejected: {status}")));
                }
                return Err(Error::ProtocolError(format!("websocket upgrade failed: {status}")));
            }
            Err(err) => return Err(Error::ProtocolError(format!("websocket connect failed: {err}"))),
        };

        let (mut write, mut read) = ws_stream.split();

        let service_info = OutboundFrame::ServiceInfo {
            service: "connector-host".to_string(),
            started_at: Utc::now().to_rfc3339(),
            connectors: self.registry.ids(),
        };
        send_frame(&mut write, &service_info).await?;
        tracing::info!("websocket session established");

        loop {
            tokio::select! {
                _ = self.reconnect.notified() => {
                    let close = CloseFrame { code: CloseCode::Normal, reason: "shutdown".into() };
                    let _ = write.send(Message::Close(Some(close))).await;
                    return Ok(());
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&mut write, text.as_str()).await;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) | Some(Ok(Message::Frame(_))) => {}
                        Some(Err(err)) => return Err(Error::ProtocolError(format!("websocket read error: {err}"))),
                    }
                    if self.shutting_down.load(Ordering::SeqCst) {
                        let close = CloseFrame { code: CloseCode::Normal, reason: "shutdown".into() };
                        let _ = write.send(Message::Close(Some(close))).await;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Parses one inbound text frame and replies, per the framing table:
    /// `ping`/`list-connectors` always reply; `operation` requires a
    /// `requestId` (missing one is logged and otherwise ignored); any
    /// frame this crate doesn't recognize replies with an error frame
    /// if it carried a `requestId`, and is just logged otherwise.
    async fn handle_text<S>(&self, write: &mut S, text: &str)
    where
        S: Sink<Message> + Unpin,
    {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "received non-JSON websocket frame");
                return;
            }
        };
        let request_id = value.get("requestId").and_then(|v| v.as_str()).map(str::to_string);

        match serde_json::from_value::<InboundFrame>(value) {
            Ok(InboundFrame::Ping { request_id }) => {
                let reply = OutboundFrame::Pong {
                    request_id,
                    timestamp: Utc::now().to_rfc3339(),
                    connectors: self.registry.ids(),
                };
                let _ = send_frame(write, &reply).await;
            }
            Ok(InboundFrame::ListConnectors { request_id }) => {
                let reply = OutboundFrame::Connectors {
                    request_id,
                    connectors: self.registry.ids(),
                };
                let _ = send_frame(write, &reply).await;
            }
            Ok(InboundFrame::Operation {
                request_id,
                connector_id,
                operation,
                payload,
            }) => {
                let Some(request_id) = request_id else {
                    tracing::warn!(connector_id = %connector_id, operation = %operation, "operation frame missing requestId, ignoring");
                    return;
                };
                let reply = match dispatch(&self.registry, &connector_id, &operation, payload).await {
                    Ok(result) => OutboundFrame::Response {
                        request_id,
                        success: true,
                        result: Some(result),
                        error: None,
                    },
                    Err(err) => OutboundFrame::Response {
                        request_id,
                        success: false,
                        result: None,
                        error: Some(WireError::from(&err)),
                    },
                };
                let _ = send_frame(write, &reply).await;
            }
            Err(_) => match request_id {
                Some(id) => {
                    let reply = OutboundFrame::Error {
                        request_id: Some(id),
                        error: WireError {
                            message: "unrecognized frame type".to_string(),
                            name: "ProtocolError".to_string(),
                        },
                    };
                    let _ = send_frame(write, &reply).await;
                }
                None => tracing::warn!(frame = %text, "received unrecognized websocket frame with no requestId"),
            },
        }
    }
}

async fn send_frame<S>(write: &mut S, frame: &OutboundFrame) -> Result<()>
where
    S: Sink<Message> + Unpin,
{
    let text = serde_json::to_string(frame)?;
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|_| Error::ProtocolError("failed to write websocket frame".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SessionConfig {
        SessionConfig {
            ws_url: "wss://example.test/ws".to_string(),
            token_url: "https://example.test/token".to_string(),
            client_id: "client-1".to_string(),
            client_secret: "secret".to_string(),
            scope: None,
            audience: None,
            resource: None,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }

    #[test]
    fn shutdown_sets_flag_and_wakes_waiters() {
        let registry = Registry::new();
        let client = SessionClient::new(test_config(), registry).unwrap();
        assert!(!client.shutting_down.load(Ordering::SeqCst));
        client.shutdown();
        assert!(client.shutting_down.load(Ordering::SeqCst));
    }
}
