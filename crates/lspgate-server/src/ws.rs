//! WebSocket endpoint bridging clients to their language server.
//!
//! Each socket carries a tagged JSON envelope: clients connect to a
//! language/room, then exchange raw LSP payloads. Server-to-client LSP
//! traffic is streamed from the process's broadcast channel.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::session::{Session, SessionRouter};
use crate::state::AppState;

/// Message from client to gateway.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Establish a language session in a room.
    Connect { language: String, room: String },
    /// A raw LSP JSON-RPC payload for the language server.
    Lsp { message: Value },
    /// Ping for keepalive.
    Ping,
}

/// Message from gateway to client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session established. `workspace_uri` is the resolved root every
    /// document URI the client sends will be mapped under; individual
    /// documents resolve as they are opened.
    Connected {
        client_id: String,
        workspace_uri: String,
    },
    /// A raw LSP JSON-RPC payload from the language server.
    Lsp { message: Value },
    /// Pong response to ping.
    Pong,
    /// Error with a stable category tag.
    Error { message: String, category: String },
}

impl ServerMessage {
    fn from_error(error: &GatewayError) -> Self {
        Self::Error {
            message: error.to_string(),
            category: error.category().to_string(),
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
#[allow(clippy::cognitive_complexity)]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let router = SessionRouter::new(state);

    let mut session: Option<Session> = None;
    let mut outbound: Option<broadcast::Receiver<Value>> = None;

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(incoming) = incoming else { break };
                match incoming {
                    Ok(Message::Text(text)) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                handle_client_message(msg, &router, &mut session, &mut outbound)
                                    .await
                            }
                            Err(e) => {
                                warn!("invalid client message: {e}");
                                Some(ServerMessage::from_error(&GatewayError::InvalidMessage(
                                    e.to_string(),
                                )))
                            }
                        };
                        if let Some(reply) = reply {
                            if send_json(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        warn!("websocket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            result = recv_outbound(&mut outbound) => {
                match result {
                    Ok(mut message) => {
                        if let Some(session) = &session {
                            session.rewrite_outbound(&mut message);
                        }
                        if send_json(&mut sender, &ServerMessage::Lsp { message }).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "client lagged behind server output");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = send_json(
                            &mut sender,
                            &ServerMessage::Error {
                                message: "language server terminated".to_string(),
                                category: "server".to_string(),
                            },
                        )
                        .await;
                        break;
                    }
                }
            }
        }
    }

    if let Some(session) = session {
        router.disconnect(&session).await;
    }
    debug!("websocket connection closed");
}

/// Dispatch one parsed client message. Returns the reply to send, if any.
async fn handle_client_message(
    msg: ClientMessage,
    router: &SessionRouter,
    session: &mut Option<Session>,
    outbound: &mut Option<broadcast::Receiver<Value>>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Connect { language, room } => {
            if session.is_some() {
                return Some(ServerMessage::from_error(&GatewayError::AlreadyConnected));
            }
            match router.connect(&language, &room).await {
                Ok(established) => {
                    *outbound = Some(established.subscribe());
                    let reply = ServerMessage::Connected {
                        client_id: established.client_id.clone(),
                        workspace_uri: established.workspace_uri(),
                    };
                    *session = Some(established);
                    Some(reply)
                }
                Err(e) => {
                    warn!(language, room, error = %e, "session establishment failed");
                    Some(ServerMessage::from_error(&e))
                }
            }
        }
        ClientMessage::Lsp { message } => {
            let Some(session) = session.as_mut() else {
                return Some(ServerMessage::from_error(&GatewayError::NotConnected));
            };
            match session.handle_lsp(router.workspaces(), message).await {
                // A violating message is dropped; the session survives.
                Ok(()) => None,
                Err(e) => Some(ServerMessage::from_error(&e)),
            }
        }
        ClientMessage::Ping => Some(ServerMessage::Pong),
    }
}

/// Await the next server message, or park forever when no session exists.
async fn recv_outbound(
    outbound: &mut Option<broadcast::Receiver<Value>>,
) -> Result<Value, broadcast::error::RecvError> {
    match outbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_json(
    sender: &mut (impl SinkExt<Message> + Unpin),
    message: &ServerMessage,
) -> Result<(), ()> {
    let Ok(json) = serde_json::to_string(message) else {
        return Ok(());
    };
    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_connect_deserialize() {
        let json = r#"{"type": "connect", "language": "python", "room": "room-1"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Connect { language, room } => {
                assert_eq!(language, "python");
                assert_eq!(room, "room-1");
            }
            _ => panic!("Expected Connect"),
        }
    }

    #[test]
    fn test_client_message_lsp_deserialize() {
        let json = r#"{"type": "lsp", "message": {"jsonrpc": "2.0", "method": "x"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Lsp { message } => {
                assert_eq!(message["method"], "x");
            }
            _ => panic!("Expected Lsp"),
        }
    }

    #[test]
    fn test_client_message_ping_deserialize() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_invalid_client_message_fails() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "bogus"}"#).is_err());
    }

    #[test]
    fn test_server_message_connected_serialize() {
        let msg = ServerMessage::Connected {
            client_id: "cli_1".to_string(),
            workspace_uri: "file:///tmp/w".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"connected""#));
        assert!(json.contains(r#""client_id":"cli_1""#));
    }

    #[test]
    fn test_server_message_error_serialize() {
        let msg = ServerMessage::from_error(&GatewayError::RoomRestricted("r1".to_string()));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""category":"room_restricted""#));
    }

    #[test]
    fn test_server_message_lsp_serialize() {
        let msg = ServerMessage::Lsp {
            message: json!({"jsonrpc": "2.0", "method": "textDocument/publishDiagnostics"}),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"lsp""#));
        assert!(json.contains("publishDiagnostics"));
    }

    #[test]
    fn test_server_message_pong_serialize() {
        let json = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert!(json.contains(r#""type":"pong""#));
    }
}
