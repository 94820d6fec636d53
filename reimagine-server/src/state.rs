//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use reimagine_core::Pipeline;

use crate::config::Config;

/// State shared across all HTTP handlers and WebSocket connections.
///
/// Built once at startup; read-only afterwards.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// The session pipeline, including the shared upstream client.
    pub pipeline: Arc<Pipeline>,
}
