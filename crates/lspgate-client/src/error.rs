//! Client adapter error types.

use lspgate_protocol::JsonRpcError;
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the gateway client adapter.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request received no response within its budget.
    #[error("request '{method}' timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    /// The gateway answered with a JSON-RPC error object.
    #[error("gateway error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The connection closed; pending requests were discarded.
    #[error("connection closed")]
    Closed,

    /// The transport failed to send.
    #[error("send failed: {0}")]
    Send(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
