//! WebSocket gateway server for lspgate.
//!
//! Exposes the gateway surface: a `/ws` endpoint where clients establish
//! language sessions and exchange LSP payloads, plus health and language
//! discovery routes. Session establishment wires together the sandbox
//! (workspace isolation), the supervisor (process acquisition), and the
//! URI rewriting that keeps clients inside their workspace.

pub mod error;
pub mod routes;
pub mod session;
pub mod state;
pub mod sweep;
pub mod ws;

pub use error::{GatewayError, GatewayResult};
pub use routes::create_router;
pub use session::{Session, SessionRouter};
pub use state::{AllowAllRooms, AppState, RoomStatusProvider};
pub use sweep::spawn_sweeper;
