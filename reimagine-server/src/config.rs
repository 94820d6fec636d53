//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use reimagine_core::services::OpenAiConfig;

/// Runtime configuration for reimagine-server.
///
/// Only the upstream credential is mandatory; every other field has a
/// default so a bare `OPENAI_API_KEY=… reimagine-server` works.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8080"`).
    pub bind_address: String,

    /// Credential for the upstream AI services (`OPENAI_API_KEY`).
    pub api_key: String,

    /// OpenAI-compatible API base (default: `https://api.openai.com/v1`).
    pub openai_base_url: String,

    pub vision_model: String,
    pub image_model: String,
    pub image_size: String,

    /// Wrap generation prompts with the literal-use policy.
    pub literal_prompt: bool,

    /// Root directory for per-session staging (default: `xlogs`).
    pub staging_dir: PathBuf,

    /// Directory holding the browser UI (default: `public`).
    pub public_dir: PathBuf,

    /// Remove session directories older than this. `None` keeps them forever.
    pub retention: Option<Duration>,

    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_bytes: usize,

    /// Comma-separated CORS allow list; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .context("OPENAI_API_KEY environment variable not set")?;

        Ok(Self {
            bind_address: env_or("REIMAGINE_BIND", "0.0.0.0:8080"),
            api_key,
            openai_base_url: env_or("REIMAGINE_OPENAI_BASE_URL", "https://api.openai.com/v1"),
            vision_model: env_or("REIMAGINE_VISION_MODEL", "gpt-4o"),
            image_model: env_or("REIMAGINE_IMAGE_MODEL", "dall-e-3"),
            image_size: env_or("REIMAGINE_IMAGE_SIZE", "1024x1024"),
            literal_prompt: lookup("REIMAGINE_LITERAL_PROMPT")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
            staging_dir: env_or("REIMAGINE_STAGING_DIR", "xlogs").into(),
            public_dir: env_or("REIMAGINE_PUBLIC_DIR", "public").into(),
            retention: lookup("REIMAGINE_RETENTION_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            max_message_bytes: lookup("REIMAGINE_MAX_MESSAGE_BYTES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(16 * 1024 * 1024),
            cors_allowed_origins: lookup("REIMAGINE_CORS_ORIGINS").filter(|v| !v.trim().is_empty()),
            log_level: env_or("REIMAGINE_LOG", "info"),
            log_json: lookup("REIMAGINE_LOG_JSON")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
        })
    }

    /// Upstream client settings derived from this configuration.
    pub fn openai(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.api_key.clone(),
            base_url: self.openai_base_url.clone(),
            vision_model: self.vision_model.clone(),
            image_model: self.image_model.clone(),
            image_size: self.image_size.clone(),
            ..OpenAiConfig::new(self.api_key.clone())
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
