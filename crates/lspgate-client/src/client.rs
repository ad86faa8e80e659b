//! The gateway client adapter.
//!
//! Wraps a [`MessageChannel`] to the gateway and gives callers a typed
//! surface: session establishment, LSP requests with locally-correlated
//! ids and timeouts, notifications, and a filtered stream of server
//! messages. When the connection closes, every pending request is
//! discarded with [`ClientError::Closed`].

use crate::channel::MessageChannel;
use crate::diagnostics::DiagnosticsFilter;
use crate::error::{ClientError, ClientResult};
use lspgate_protocol::{Incoming, JsonRpcNotification, JsonRpcRequest};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, warn};

const MESSAGE_QUEUE_DEPTH: usize = 256;

/// Adapter configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Budget for every LSP request.
    pub request_timeout: Duration,
    /// Budget for session establishment (covers a cold server spawn).
    pub connect_timeout: Duration,
    /// Filter applied to diagnostics before they reach subscribers.
    pub filter: DiagnosticsFilter,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(120),
            filter: DiagnosticsFilter::default(),
        }
    }
}

/// Session lifecycle events from the gateway.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected {
        client_id: String,
        workspace_uri: String,
    },
    Error {
        message: String,
        category: String,
    },
    Closed,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<ClientResult<Value>>>>>;

/// A client session against the gateway.
pub struct GatewayClient {
    outgoing: mpsc::Sender<Value>,
    pending: PendingMap,
    next_id: AtomicU64,
    messages: broadcast::Sender<Value>,
    events: broadcast::Sender<SessionEvent>,
    config: ClientConfig,
}

impl GatewayClient {
    /// Start the adapter over a channel. The returned client is cheap to
    /// share behind an `Arc`.
    pub fn spawn(channel: impl MessageChannel + 'static, config: ClientConfig) -> Self {
        let (outgoing, outgoing_rx) = mpsc::channel(MESSAGE_QUEUE_DEPTH);
        let (messages, _) = broadcast::channel(MESSAGE_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(16);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(pump(
            channel,
            outgoing_rx,
            Arc::clone(&pending),
            messages.clone(),
            events.clone(),
            config.filter.clone(),
        ));

        Self {
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            messages,
            events,
            config,
        }
    }

    /// Establish a language session in a room. Resolves on the gateway's
    /// `connected` reply or its error.
    pub async fn connect(&self, language: &str, room: &str) -> ClientResult<SessionEvent> {
        let mut events = self.events.subscribe();
        self.send_envelope(json!({
            "type": "connect",
            "language": language,
            "room": room,
        }))
        .await?;

        let deadline = tokio::time::timeout(self.config.connect_timeout, async {
            loop {
                match events.recv().await {
                    Ok(event @ SessionEvent::Connected { .. }) => return Ok(event),
                    Ok(SessionEvent::Error { message, category }) => {
                        return Err(ClientError::Rpc(lspgate_protocol::JsonRpcError {
                            code: -32000,
                            message: format!("{category}: {message}"),
                            data: None,
                        }))
                    }
                    Ok(SessionEvent::Closed) | Err(broadcast::error::RecvError::Closed) => {
                        return Err(ClientError::Closed)
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
        deadline.await.map_err(|_| ClientError::Timeout {
            method: "connect".to_string(),
            after: self.config.connect_timeout,
        })?
    }

    /// Send an LSP request and await its response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let message = serde_json::to_value(JsonRpcRequest::new(id, method, params))?;
        if let Err(e) = self
            .send_envelope(json!({"type": "lsp", "message": message}))
            .await
        {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout {
                    method: method.to_string(),
                    after: self.config.request_timeout,
                })
            }
        }
    }

    /// Send an LSP notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        let message = serde_json::to_value(JsonRpcNotification::new(method, params))?;
        self.send_envelope(json!({"type": "lsp", "message": message}))
            .await
    }

    /// Keepalive ping.
    pub async fn ping(&self) -> ClientResult<()> {
        self.send_envelope(json!({"type": "ping"})).await
    }

    /// Subscribe to filtered server-to-client LSP messages.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<Value> {
        self.messages.subscribe()
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn send_envelope(&self, envelope: Value) -> ClientResult<()> {
        self.outgoing
            .send(envelope)
            .await
            .map_err(|_| ClientError::Closed)
    }
}

/// Drive the channel: writer side drains the outgoing queue, reader side
/// dispatches gateway envelopes.
async fn pump(
    mut channel: impl MessageChannel,
    mut outgoing_rx: mpsc::Receiver<Value>,
    pending: PendingMap,
    messages: broadcast::Sender<Value>,
    events: broadcast::Sender<SessionEvent>,
    filter: DiagnosticsFilter,
) {
    loop {
        tokio::select! {
            out = outgoing_rx.recv() => {
                let Some(out) = out else { break };
                if channel.send(out).await.is_err() {
                    break;
                }
            }
            incoming = channel.recv() => {
                let Some(envelope) = incoming else { break };
                dispatch(envelope, &pending, &messages, &events, &filter).await;
            }
        }
    }

    // Connection gone: discard every pending request.
    let drained: Vec<_> = pending.lock().await.drain().collect();
    if !drained.is_empty() {
        debug!(discarded = drained.len(), "discarding pending requests on close");
    }
    for (_, tx) in drained {
        let _ = tx.send(Err(ClientError::Closed));
    }
    let _ = events.send(SessionEvent::Closed);
}

async fn dispatch(
    envelope: Value,
    pending: &PendingMap,
    messages: &broadcast::Sender<Value>,
    events: &broadcast::Sender<SessionEvent>,
    filter: &DiagnosticsFilter,
) {
    match envelope.get("type").and_then(Value::as_str) {
        Some("lsp") => {
            let Some(mut message) = envelope.get("message").cloned() else {
                return;
            };
            if let Some(Incoming::Response { id, result, error }) =
                Incoming::classify(message.clone())
            {
                if let Some(id) = id.as_u64() {
                    if let Some(tx) = pending.lock().await.remove(&id) {
                        let outcome = match error {
                            Some(error) => Err(ClientError::Rpc(error)),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(outcome);
                        return;
                    }
                }
            }
            filter.apply(&mut message);
            let _ = messages.send(message);
        }
        Some("connected") => {
            let client_id = envelope
                .get("client_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let workspace_uri = envelope
                .get("workspace_uri")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let _ = events.send(SessionEvent::Connected {
                client_id,
                workspace_uri,
            });
        }
        Some("error") => {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let category = envelope
                .get("category")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let _ = events.send(SessionEvent::Error { message, category });
        }
        Some("pong") => {}
        other => warn!(?other, "unknown gateway envelope"),
    }
}
