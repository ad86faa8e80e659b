//! Error types for sandbox operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// A rejected file path or URI.
///
/// These are reported to the offending client as security errors and the
/// operation is dropped; the language server never sees the path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathSecurityError {
    /// The raw URI contains a traversal token (`..`, encoded or not).
    #[error("path traversal detected in URI")]
    Traversal,

    /// The URI scheme is not `file`.
    #[error("unsupported URI scheme: {0}")]
    InvalidScheme(String),

    /// The URI could not be parsed at all.
    #[error("malformed URI: {0}")]
    InvalidUri(String),

    /// The decoded path contains a null byte.
    #[error("null byte in decoded path")]
    NullByte,

    /// The file extension is not on the allow-list.
    #[error("file extension not allowed: {0}")]
    ExtensionNotAllowed(String),

    /// The filename matches the sensitive-name denylist.
    #[error("filename is denied: {0}")]
    DeniedName(String),

    /// The resolved path escapes the workspace root.
    #[error("path escapes workspace root")]
    OutsideWorkspace,
}

/// Errors that can occur during workspace operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A URI or path failed security validation.
    #[error(transparent)]
    Path(#[from] PathSecurityError),

    /// Session key contains characters unsafe for a directory name.
    #[error("invalid session key: {0}")]
    InvalidSessionKey(String),

    /// A single file exceeded the per-file size ceiling.
    #[error("file of {size} bytes exceeds the {limit} byte ceiling")]
    FileTooLarge { size: u64, limit: u64 },

    /// The session hit its file-count ceiling.
    #[error("session already holds {limit} files")]
    TooManyFiles { limit: usize },

    /// Failed to write a file.
    #[error("failed to write file '{path}': {message}")]
    WriteFailed { path: PathBuf, message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Create a write failed error.
    pub fn write_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a security rejection (vs. an operational one).
    pub fn is_security_violation(&self) -> bool {
        matches!(self, Self::Path(_) | Self::InvalidSessionKey(_))
    }
}
