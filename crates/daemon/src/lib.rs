// Re-export modules for library use and integration tests
pub mod config;
pub mod messages;
pub mod registry;
pub mod server;
pub mod session;

use std::sync::Arc;

use car_link::{CommandSet, LinkHandle};

use crate::registry::ClientRegistry;

/// Shared state handed to every WebSocket session.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the single vehicle link task.
    pub link: LinkHandle,
    /// All currently open client sessions.
    pub registry: Arc<ClientRegistry>,
    /// Prebuilt command payloads for the configured speeds.
    pub commands: Arc<CommandSet>,
}
