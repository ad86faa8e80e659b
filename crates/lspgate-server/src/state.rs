//! Shared application state.

use async_trait::async_trait;
use lspgate_sandbox::WorkspaceManager;
use lspgate_supervisor::ProcessRegistry;
use std::sync::Arc;

/// Decides whether a room currently admits language sessions.
///
/// The default implementation admits everything; deployments embed the
/// gateway behind their own room model and plug in a real provider.
#[async_trait]
pub trait RoomStatusProvider: Send + Sync {
    async fn allows_language_sessions(&self, room: &str) -> bool;
}

/// Provider that admits every room.
pub struct AllowAllRooms;

#[async_trait]
impl RoomStatusProvider for AllowAllRooms {
    async fn allows_language_sessions(&self, _room: &str) -> bool {
        true
    }
}

/// Shared state handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProcessRegistry>,
    pub workspaces: Arc<WorkspaceManager>,
    pub rooms: Arc<dyn RoomStatusProvider>,
}

impl AppState {
    pub fn new(registry: Arc<ProcessRegistry>, workspaces: Arc<WorkspaceManager>) -> Self {
        Self {
            registry,
            workspaces,
            rooms: Arc::new(AllowAllRooms),
        }
    }

    /// Replace the room admission provider.
    pub fn with_room_provider(mut self, rooms: Arc<dyn RoomStatusProvider>) -> Self {
        self.rooms = rooms;
        self
    }
}
