//! reimagine-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Prepare the staging root.
//! 4. Build the upstream clients and the session pipeline.
//! 5. Start the retention sweeper when a retention window is configured.
//! 6. Build the Axum router and start the HTTP server with graceful shutdown.

mod config;
mod error;
mod middleware;
mod retention;
mod routes;
mod state;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use reimagine_core::services::{HttpFetcher, OpenAiClient};
use reimagine_core::{Pipeline, PipelineConfig, Staging};
use tracing::{info, warn};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env()?;

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: REIMAGINE_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "reimagine-server starting");

    // ── 3. Staging ─────────────────────────────────────────────────────────────
    let staging = Arc::new(Staging::new(&cfg.staging_dir));
    // Sessions still run without a staging root; they just skip persistence.
    match staging.ensure_root().await {
        Ok(()) => info!(root = %cfg.staging_dir.display(), "staging ready"),
        Err(e) => warn!(root = %cfg.staging_dir.display(), error = %e, "staging root unavailable"),
    }

    // ── 4. Upstream clients and pipeline ───────────────────────────────────────
    let http = reqwest::Client::builder()
        .user_agent(concat!("reimagine-server/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;
    let openai = Arc::new(OpenAiClient::new(http.clone(), cfg.openai()));
    info!(
        vision_model = %cfg.vision_model,
        image_model = %cfg.image_model,
        literal_prompt = cfg.literal_prompt,
        "upstream services configured"
    );

    let pipeline = Pipeline::new(
        Arc::clone(&staging),
        openai.clone(),
        openai,
        Arc::new(HttpFetcher::new(http)),
        PipelineConfig {
            literal_prompt: cfg.literal_prompt,
            ..PipelineConfig::default()
        },
    );

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        pipeline: Arc::new(pipeline),
    });

    // ── 5. Retention ───────────────────────────────────────────────────────────
    if let Some(retention) = cfg.retention {
        retention::spawn_sweeper(Arc::clone(&staging), retention);
    }

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg
        .bind_address
        .parse()
        .with_context(|| format!("invalid REIMAGINE_BIND '{}'", cfg.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, public_dir = %cfg.public_dir.display(), "HTTP server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("reimagine-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
