//! Gateway error type and its wire categories.

use lspgate_sandbox::{PathSecurityError, SandboxError};
use lspgate_supervisor::SupervisorError;
use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced to WebSocket clients.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The requested language has no configured server.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The room does not currently admit language sessions.
    #[error("room '{0}' does not allow language sessions")]
    RoomRestricted(String),

    /// The client sent a message before establishing a session.
    #[error("no active session; send a connect message first")]
    NotConnected,

    /// The client tried to connect twice on one socket.
    #[error("session already established on this connection")]
    AlreadyConnected,

    /// A document URI failed sandbox validation.
    #[error(transparent)]
    PathSecurity(#[from] PathSecurityError),

    /// Workspace management failed.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Process supervision failed.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// The client message was not valid JSON-RPC.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl GatewayError {
    /// Stable category tag sent alongside the error message so clients can
    /// branch without parsing prose.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedLanguage(_) => "unsupported_language",
            Self::RoomRestricted(_) => "room_restricted",
            Self::NotConnected | Self::AlreadyConnected => "session",
            Self::PathSecurity(_) => "path_security",
            Self::Sandbox(SandboxError::Path(_)) => "path_security",
            Self::Sandbox(_) => "workspace",
            Self::Supervisor(SupervisorError::Launch { .. }) => "launch",
            Self::Supervisor(SupervisorError::UnsupportedLanguage(_)) => "unsupported_language",
            Self::Supervisor(SupervisorError::Timeout { .. }) => "timeout",
            Self::Supervisor(SupervisorError::Framing(_)) => "framing",
            Self::Supervisor(_) => "server",
            Self::InvalidMessage(_) => "protocol",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_categories() {
        assert_eq!(
            GatewayError::UnsupportedLanguage("cobol".into()).category(),
            "unsupported_language"
        );
        assert_eq!(
            GatewayError::RoomRestricted("r1".into()).category(),
            "room_restricted"
        );
        assert_eq!(
            GatewayError::PathSecurity(PathSecurityError::Traversal).category(),
            "path_security"
        );
        assert_eq!(
            GatewayError::Supervisor(SupervisorError::Timeout {
                method: "initialize".into(),
                after: Duration::from_secs(60),
            })
            .category(),
            "timeout"
        );
        assert_eq!(GatewayError::NotConnected.category(), "session");
    }
}
