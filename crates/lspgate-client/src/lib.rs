//! Client-side session adapter for lspgate.
//!
//! Applications embedding an editor use this crate to talk to the
//! gateway: [`GatewayClient`] manages one session over any
//! [`MessageChannel`], correlating request ids locally, applying
//! per-request timeouts, and filtering noisy diagnostics through a
//! [`DiagnosticsFilter`] before they reach the editor.

pub mod channel;
pub mod client;
pub mod diagnostics;
pub mod error;

pub use channel::{pair, MemoryChannel, MessageChannel};
pub use client::{ClientConfig, GatewayClient, SessionEvent};
pub use diagnostics::DiagnosticsFilter;
pub use error::{ClientError, ClientResult};
