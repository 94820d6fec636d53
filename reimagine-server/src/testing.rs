//! Shared fixtures for the server's unit tests.

use std::path::Path;
use std::sync::Arc;

use reimagine_core::services::{HttpFetcher, OpenAiClient};
use reimagine_core::{Pipeline, PipelineConfig, Staging};

use crate::config::Config;
use crate::state::AppState;

fn state(vars: &[(&str, &str)]) -> Arc<AppState> {
    let config = Config::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
            .or_else(|| (key == "OPENAI_API_KEY").then(|| "sk-test".to_owned()))
    })
    .unwrap();

    // Upstream calls go to a closed port; router tests never start a session.
    let mut openai = config.openai();
    openai.base_url = "http://127.0.0.1:9/v1".into();
    let client = Arc::new(OpenAiClient::new(reqwest::Client::new(), openai));

    let pipeline = Pipeline::new(
        Arc::new(Staging::new(&config.staging_dir)),
        client.clone(),
        client,
        Arc::new(HttpFetcher::default()),
        PipelineConfig::default(),
    );

    Arc::new(AppState {
        config: Arc::new(config),
        pipeline: Arc::new(pipeline),
    })
}

pub fn state_with_staging(staging: &Path) -> Arc<AppState> {
    state(&[("REIMAGINE_STAGING_DIR", &*staging.to_string_lossy())])
}

pub fn state_with_dirs(staging: &Path, public: &Path) -> Arc<AppState> {
    state(&[
        ("REIMAGINE_STAGING_DIR", &*staging.to_string_lossy()),
        ("REIMAGINE_PUBLIC_DIR", &*public.to_string_lossy()),
    ])
}

pub fn state_with_cors(staging: &Path, origins: Option<&str>) -> Arc<AppState> {
    let staging = staging.to_string_lossy();
    let mut vars = vec![("REIMAGINE_STAGING_DIR", &*staging)];
    if let Some(origins) = origins {
        vars.push(("REIMAGINE_CORS_ORIGINS", origins));
    }
    state(&vars)
}
