//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every request handler.

use nettable_core::ports::TableStore;
use nettable_core::registry::SessionRegistry;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Every user's conversation. The only way events reach the state machine.
    pub registry: Arc<SessionRegistry>,
    /// Read path for browsing and searching the committed table.
    pub store: Arc<dyn TableStore>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        let store = registry.store().clone();
        Self { registry, store }
    }
}
