//! Health / heartbeat endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::state::AppState;

/// Register health-check routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Heartbeat endpoint.
///
/// Always HTTP 200. `status` is `"ok"` while the staging root is a
/// directory and `"degraded"` otherwise: sessions still run then, but
/// nothing gets staged.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let staging = state.pipeline.staging().root();
    let staging_ready = tokio::fs::metadata(staging)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    Json(json!({
        "status":  if staging_ready { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "staging": {
            "root":  staging.display().to_string(),
            "ready": staging_ready,
        },
    }))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::state_with_staging;

    #[tokio::test]
    async fn health_is_ok_with_staging_root() {
        let tmp = tempfile::tempdir().unwrap();
        let Json(body) = get_health(State(state_with_staging(tmp.path()))).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["staging"]["ready"], true);
        assert!(!body["version"].as_str().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn health_is_degraded_without_staging_root() {
        let tmp = tempfile::tempdir().unwrap();
        let Json(body) = get_health(State(state_with_staging(&tmp.path().join("missing")))).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["staging"]["ready"], false);
    }
}
