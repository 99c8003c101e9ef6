//! HTTP API for help-ai
//!
//! Conversation CRUD over the configured store, plus the chat route that runs
//! one exchange through the local transport.

mod handlers;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::assistant::Assistant;
use crate::store::Storage;
use crate::transport::{ChatTransport, LocalTransport};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub transport: Arc<dyn ChatTransport>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, assistant: Arc<dyn Assistant>) -> Self {
        Self {
            transport: Arc::new(LocalTransport::new(storage.clone(), assistant)),
            storage,
        }
    }
}
