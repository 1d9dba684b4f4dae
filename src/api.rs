//! HTTP API and web front end

mod assets;
mod handlers;
mod sse;
mod types;
mod ws;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::runtime::Assistant;
use crate::voice::AudioStore;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    pub store: Arc<AudioStore>,
}

impl AppState {
    pub fn new(assistant: Arc<Assistant>, store: AudioStore) -> Self {
        Self {
            assistant,
            store: Arc::new(store),
        }
    }
}
