//! Capabilities the session pipeline depends on.
//!
//! Each capability is a narrow async trait so the pipeline can be driven by
//! the real HTTP-backed implementations in production and by fakes in tests.

pub mod fetch;
pub mod openai;
pub mod transcode;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::embed::EmbeddedImage;
use crate::error::ServiceError;

pub use fetch::HttpFetcher;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use transcode::{RasterFormat, transcode};

/// Token accounting reported by the vision service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Text produced by the vision service for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub text: String,
    pub usage: Usage,
}

/// One entry returned by the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
    /// The prompt the service actually used, when it rewrote ours.
    pub revised_prompt: Option<String>,
}

#[async_trait]
pub trait DescribeImage: Send + Sync {
    async fn describe(&self, image: &EmbeddedImage) -> Result<Description, ServiceError>;
}

#[async_trait]
pub trait GenerateImage: Send + Sync {
    /// Generate images for `prompt`. With `literal` set the prompt is wrapped
    /// by [`literal_prompt`] before submission.
    async fn generate(&self, prompt: &str, literal: bool)
    -> Result<Vec<GeneratedImage>, ServiceError>;
}

#[async_trait]
pub trait FetchImage: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, ServiceError>;
}

/// Wrap `text` so the generation service uses it as-is instead of
/// embellishing it. `text` appears verbatim in the result.
pub fn literal_prompt(text: &str) -> String {
    format!(
        "I NEED to test how the tool works with extremely concrete prompts. \
         DO NOT add any detail or variation, just use it AS-IS:`{text}`"
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn literal_prompt_keeps_text_verbatim() {
        let wrapped = literal_prompt("red circle");
        assert!(wrapped.contains("`red circle`"));
        assert!(wrapped.starts_with("I NEED to test"));
    }

    #[test]
    fn usage_tolerates_missing_fields() {
        let usage: Usage = serde_json::from_str(r#"{"total_tokens": 12}"#).unwrap();
        assert_eq!(usage, Usage { prompt_tokens: 0, completion_tokens: 0, total_tokens: 12 });
    }
}
