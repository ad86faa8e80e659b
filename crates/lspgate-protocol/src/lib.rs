//! JSON-RPC 2.0 message types and LSP wire framing for lspgate.
//!
//! This crate owns everything that touches raw protocol bytes:
//! - Typed JSON-RPC messages (request, response, notification, error object)
//! - Classification of inbound messages from an untyped [`serde_json::Value`]
//! - The `Content-Length`-delimited framing used by the standard LSP stdio
//!   transport, including an incremental [`FrameDecoder`] that tolerates
//!   partial reads, corrupted frames, and misbehaving peers.
//!
//! Nothing in here spawns processes or performs I/O; the framer operates
//! on byte slices so it can sit behind any transport.

pub mod error;
pub mod framer;
pub mod message;

pub use error::{FramingError, ProtocolResult};
pub use framer::{encode, encode_value, FrameDecoder};
pub use message::{Incoming, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
