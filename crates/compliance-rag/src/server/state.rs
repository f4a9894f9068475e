//! Application state for the RAG server

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::engine::RagEngine;
use crate::error::Result;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Engine serving every route
    engine: Arc<RagEngine>,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create new application state from configuration
    pub fn new(config: RagConfig) -> Result<Self> {
        tracing::info!("Initializing RAG application state...");
        let engine = RagEngine::from_config(config)?;
        Ok(Self::from_engine(Arc::new(engine)))
    }

    /// Wrap an existing engine
    pub fn from_engine(engine: Arc<RagEngine>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                ready: RwLock::new(true),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<RagEngine> {
        &self.inner.engine
    }

    pub fn config(&self) -> &RagConfig {
        self.inner.engine.config()
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
