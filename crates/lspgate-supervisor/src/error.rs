//! Supervisor error types.

use lspgate_protocol::{FramingError, JsonRpcError};
use std::time::Duration;
use thiserror::Error;

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Errors that can occur while supervising language server processes.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The server process failed to start or exited immediately.
    #[error("failed to launch {language} server: {message}")]
    Launch { language: String, message: String },

    /// No launch spec is configured for the requested language.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// A request received no response within its budget. The process is
    /// left running; a slow response is not evidence of a dead process.
    #[error("request '{method}' timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    /// The server answered with a JSON-RPC error object.
    #[error("server error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The process is gone; outstanding requests were rejected.
    #[error("process terminated: {0}")]
    ProcessGone(String),

    /// The owning client disconnected before the request settled.
    #[error("client disconnected")]
    ClientDisconnected,

    /// Wire framing became unrecoverable.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Create a launch error.
    pub fn launch(language: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Launch {
            language: language.into(),
            message: message.into(),
        }
    }

    /// Create a process-gone error.
    pub fn process_gone(message: impl Into<String>) -> Self {
        Self::ProcessGone(message.into())
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
