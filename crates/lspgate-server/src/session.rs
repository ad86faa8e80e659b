//! Session establishment and LSP message routing.
//!
//! A [`Session`] is one client connection bound to one language server
//! process. Document URIs from the client are validated and rewritten to
//! point into the session's workspace before the server sees them, and
//! rewritten back on the way out so the client only ever sees its own
//! URIs.

use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;
use lspgate_sandbox::WorkspaceManager;
use lspgate_supervisor::LanguageServerProcess;
use lspgate_util::{IdPrefix, Identifier};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// One established client session.
#[derive(Debug)]
pub struct Session {
    pub client_id: String,
    pub language: String,
    pub room: String,
    /// Registry key; also names the workspace directory.
    pub key: String,
    pub workspace_root: PathBuf,
    process: Arc<LanguageServerProcess>,
    /// Client URI -> workspace URI, learned as documents are touched.
    uri_map: HashMap<String, String>,
    reverse_map: HashMap<String, String>,
}

/// Connects and disconnects sessions against the shared state.
#[derive(Clone)]
pub struct SessionRouter {
    state: AppState,
}

impl SessionRouter {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Establish a session: check room admission, prepare the workspace,
    /// and acquire (possibly spawning) the language server process.
    pub async fn connect(&self, language: &str, room: &str) -> GatewayResult<Session> {
        if !self.state.rooms.allows_language_sessions(room).await {
            warn!(room, "rejected session for restricted room");
            return Err(GatewayError::RoomRestricted(room.to_string()));
        }
        if self.state.registry.spec(language).is_none() {
            return Err(GatewayError::UnsupportedLanguage(language.to_string()));
        }

        let client_id = Identifier::ascending(IdPrefix::Client);
        let key = self
            .state
            .registry
            .session_key(language, room, &client_id)?;

        let workspace_root = self.state.workspaces.prepare(&key).await?;
        self.state
            .workspaces
            .scaffold(language, &workspace_root)
            .await?;

        let process = self
            .state
            .registry
            .acquire(language, &key, &workspace_root)
            .await?;

        info!(client = %client_id, language, room, key = %key, "session established");
        Ok(Session {
            client_id,
            language: language.to_string(),
            room: room.to_string(),
            key,
            workspace_root,
            process,
            uri_map: HashMap::new(),
            reverse_map: HashMap::new(),
        })
    }

    /// Tear a session down. The registry shuts the process down once the
    /// last session referencing it releases. A per-connection workspace is
    /// deleted here; a shared one stays on disk for the rest of the room
    /// until the retention sweep reclaims it.
    pub async fn disconnect(&self, session: &Session) {
        info!(client = %session.client_id, key = %session.key, "session closed");
        self.state.registry.release(&session.key).await;

        let shared = self
            .state
            .registry
            .spec(&session.language)
            .map(|s| s.shared_per_room)
            .unwrap_or(false);
        if !shared {
            if let Err(error) = self.state.workspaces.remove(&session.key).await {
                warn!(key = %session.key, %error, "failed to remove workspace");
            }
        }
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.state.workspaces
    }
}

impl Session {
    /// Subscribe to the server-to-client message stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.process.subscribe()
    }

    /// The workspace root as a file URI.
    pub fn workspace_uri(&self) -> String {
        format!("file://{}", self.workspace_root.display())
    }

    /// Validate, mirror, rewrite, and forward one client LSP message.
    pub async fn handle_lsp(
        &mut self,
        workspaces: &WorkspaceManager,
        mut message: Value,
    ) -> GatewayResult<()> {
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // Mirror document content to disk before the server learns about
        // the file, so servers that read from disk see current content.
        match method.as_str() {
            "textDocument/didOpen" => {
                let uri = document_uri(&message)
                    .ok_or_else(|| GatewayError::InvalidMessage("didOpen without uri".into()))?;
                let text = message
                    .pointer("/params/textDocument/text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let safe = workspaces.validate(&uri, &self.workspace_root)?;
                workspaces
                    .write(&safe, text.as_bytes(), &self.workspace_root)
                    .await?;
            }
            "textDocument/didChange" => {
                if let (Some(uri), Some(text)) = (document_uri(&message), full_sync_text(&message))
                {
                    let safe = workspaces.validate(&uri, &self.workspace_root)?;
                    workspaces
                        .write(&safe, text.as_bytes(), &self.workspace_root)
                        .await?;
                }
            }
            _ => {}
        }

        if let Some(params) = message.get_mut("params") {
            self.rewrite_inbound(workspaces, params)?;
        }
        debug!(client = %self.client_id, method = %method, "forwarding to server");
        self.process.forward_raw(&message).await?;
        Ok(())
    }

    /// Rewrite every `uri` field in a client message to its workspace
    /// counterpart, validating each one.
    fn rewrite_inbound(
        &mut self,
        workspaces: &WorkspaceManager,
        value: &mut Value,
    ) -> GatewayResult<()> {
        match value {
            Value::Object(map) => {
                for (key, entry) in map.iter_mut() {
                    if key == "uri" {
                        if let Some(uri) = entry.as_str() {
                            let mapped = self.map_document_uri(workspaces, uri)?;
                            *entry = Value::String(mapped);
                            continue;
                        }
                    }
                    self.rewrite_inbound(workspaces, entry)?;
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.rewrite_inbound(workspaces, item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn map_document_uri(
        &mut self,
        workspaces: &WorkspaceManager,
        uri: &str,
    ) -> GatewayResult<String> {
        if let Some(mapped) = self.uri_map.get(uri) {
            return Ok(mapped.clone());
        }
        let safe = workspaces.validate(uri, &self.workspace_root)?;
        let mapped = safe.to_uri();
        self.uri_map.insert(uri.to_string(), mapped.clone());
        self.reverse_map.insert(mapped.clone(), uri.to_string());
        Ok(mapped)
    }

    /// Rewrite workspace URIs in a server message back to the URIs the
    /// client originally sent.
    pub fn rewrite_outbound(&self, message: &mut Value) {
        let prefix = self.workspace_uri();
        rewrite_strings(message, &mut |s| {
            if let Some(original) = self.reverse_map.get(s) {
                return Some(original.clone());
            }
            // Server-minted URIs (files the client never sent) still get
            // their workspace prefix stripped so nothing leaks host paths.
            s.strip_prefix(&prefix)
                .map(|rest| format!("file://{rest}"))
        });
    }
}

/// `params.textDocument.uri`, when present.
fn document_uri(message: &Value) -> Option<String> {
    message
        .pointer("/params/textDocument/uri")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Full-document text from a didChange, when the client uses full sync
/// (a content change without a range).
fn full_sync_text(message: &Value) -> Option<String> {
    let changes = message
        .pointer("/params/contentChanges")
        .and_then(Value::as_array)?;
    let last = changes.last()?;
    if last.get("range").is_some() {
        return None;
    }
    last.get("text").and_then(Value::as_str).map(str::to_string)
}

/// Apply a string rewrite everywhere in a JSON tree.
fn rewrite_strings(value: &mut Value, rewrite: &mut impl FnMut(&str) -> Option<String>) {
    match value {
        Value::String(s) => {
            if let Some(replacement) = rewrite(s) {
                *s = replacement;
            }
        }
        Value::Object(map) => {
            for entry in map.values_mut() {
                rewrite_strings(entry, rewrite);
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_strings(item, rewrite);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_uri_extraction() {
        let message = json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didOpen",
            "params": {"textDocument": {"uri": "file:///main.py", "text": "x"}}
        });
        assert_eq!(document_uri(&message).unwrap(), "file:///main.py");
        assert_eq!(document_uri(&json!({"method": "x"})), None);
    }

    #[test]
    fn test_full_sync_text() {
        let full = json!({
            "params": {"contentChanges": [{"text": "whole file"}]}
        });
        assert_eq!(full_sync_text(&full).unwrap(), "whole file");

        let incremental = json!({
            "params": {"contentChanges": [{
                "range": {"start": {"line": 0, "character": 0},
                          "end": {"line": 0, "character": 1}},
                "text": "y"
            }]}
        });
        assert_eq!(full_sync_text(&incremental), None);

        assert_eq!(full_sync_text(&json!({"params": {}})), None);
    }

    #[test]
    fn test_rewrite_strings_walks_nested_values() {
        let mut value = json!({
            "a": "file:///w/main.py",
            "b": [{"uri": "file:///w/other.py"}, 42],
            "c": {"deep": {"uri": "untouched"}}
        });
        rewrite_strings(&mut value, &mut |s| {
            s.strip_prefix("file:///w").map(|r| format!("file://{r}"))
        });
        assert_eq!(value["a"], "file:///main.py");
        assert_eq!(value["b"][0]["uri"], "file:///other.py");
        assert_eq!(value["c"]["deep"]["uri"], "untouched");
    }
}
