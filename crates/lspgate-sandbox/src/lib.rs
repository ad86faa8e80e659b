//! Per-session workspace isolation for lspgate.
//!
//! Every session gets an exclusive directory under a configured base, and
//! every client-supplied file URI must pass validation before any byte is
//! written or forwarded to a language server. Validation is deliberately
//! paranoid: traversal tokens are rejected on the *raw* URI before any
//! parser gets a chance to normalize them away, and the final resolved
//! path must be a strict descendant of the session's workspace root.
//!
//! All failures here reject a single operation; none are fatal to the
//! gateway process.

pub mod config;
pub mod error;
pub mod path;
pub mod workspace;

pub use config::SandboxConfig;
pub use error::{PathSecurityError, SandboxError, SandboxResult};
pub use path::{validate, SafePath};
pub use workspace::WorkspaceManager;
