//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Health / heartbeat route
//! - The WebSocket gateway at `/ws`
//! - The browser UI, served from the public directory for every other path

mod health;
pub(crate) mod ws;

use std::sync::Arc;

use axum::{Router, middleware};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;

use crate::middleware::{cors, trace};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let ui = ServeDir::new(&state.config.public_dir);

    Router::new()
        .merge(health::router())
        .merge(ws::router())
        .fallback_service(ui)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(trace::trace_middleware))
                .layer(cors::cors_layer(&state)),
        )
        .with_state(state)
}
