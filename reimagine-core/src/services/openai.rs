//! OpenAI-compatible vision and image-generation client.
//!
//! A single [`OpenAiClient`] is built at startup and shared by reference
//! (`Arc`) with every session; it is never rebuilt per request.
//!
//! Endpoints used:
//! - `POST {base}/chat/completions` with an `image_url` content part (vision)
//! - `POST {base}/images/generations` (text-to-image)

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Description, DescribeImage, GenerateImage, GeneratedImage, Usage, literal_prompt};
use crate::embed::EmbeddedImage;
use crate::error::ServiceError;

/// Instruction sent alongside the photo to the vision model.
const DESCRIBE_INSTRUCTION: &str = "Describe the visual features of this image so an image \
     generation model can recreate it as similarly looking as possible. Make the description \
     detailed. Output only the description.";

/// Upper bound on logged response bodies.
const MAX_LOGGED_BODY: usize = 2000;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// API base without trailing slash, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub vision_model: String,
    pub image_model: String,
    /// Generation size, e.g. `1024x1024`.
    pub image_size: String,
    pub max_tokens: u32,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_owned(),
            vision_model: "gpt-4o".to_owned(),
            image_model: "dall-e-3".to_owned(),
            image_size: "1024x1024".to_owned(),
            max_tokens: 1024,
        }
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Deserialize, Debug)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageEntry>,
}

#[derive(Deserialize, Debug)]
struct ImageEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, config: OpenAiConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(%status, body = %truncate_for_log(&text, MAX_LOGGED_BODY), path, "upstream service error");
            return Err(ServiceError::Status { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %truncate_for_log(&text, MAX_LOGGED_BODY), path, "undecodable response");
            ServiceError::Decode(e)
        })
    }
}

#[async_trait]
impl DescribeImage for OpenAiClient {
    async fn describe(&self, image: &EmbeddedImage) -> Result<Description, ServiceError> {
        let request = ChatRequest {
            model: &self.config.vision_model,
            max_tokens: self.config.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: DESCRIBE_INSTRUCTION },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image.to_data_url() },
                    },
                ],
            }],
        };

        debug!(model = %self.config.vision_model, image_bytes = image.bytes.len(), "requesting description");
        let response: ChatResponse = self.post_json("chat/completions", &request).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ServiceError::Empty)?;
        let usage = response.usage.unwrap_or_default();

        info!(chars = text.len(), total_tokens = usage.total_tokens, "image described");
        Ok(Description { text, usage })
    }
}

#[async_trait]
impl GenerateImage for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        literal: bool,
    ) -> Result<Vec<GeneratedImage>, ServiceError> {
        let prompt = if literal { literal_prompt(prompt) } else { prompt.to_owned() };
        let request = ImagesRequest {
            model: &self.config.image_model,
            prompt: &prompt,
            n: 1,
            size: &self.config.image_size,
        };

        debug!(model = %self.config.image_model, prompt_len = prompt.len(), literal, "requesting generation");
        let response: ImagesResponse = self.post_json("images/generations", &request).await?;

        let results: Vec<GeneratedImage> = response
            .data
            .into_iter()
            .filter_map(|entry| {
                entry.url.map(|url| GeneratedImage {
                    url,
                    revised_prompt: entry.revised_prompt,
                })
            })
            .collect();

        info!(results = results.len(), "image generation finished");
        Ok(results)
    }
}

fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_owned();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated, total_len={}]", &s[..end], s.len())
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::testing::serve;

    fn client(base_url: String) -> OpenAiClient {
        let mut config = OpenAiConfig::new("sk-test");
        config.base_url = base_url;
        OpenAiClient::new(reqwest::Client::new(), config)
    }

    #[tokio::test]
    async fn describe_sends_image_and_reads_usage() {
        let seen: Arc<Mutex<Option<(Value, String)>>> = Arc::default();
        let captured = seen.clone();
        let router = Router::new().route(
            "/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_owned();
                    *captured.lock().unwrap() = Some((body, auth));
                    Json(json!({
                        "choices": [{ "message": { "role": "assistant", "content": "red circle" } }],
                        "usage": { "prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12 }
                    }))
                }
            }),
        );
        let base = serve(router).await;

        let image = EmbeddedImage::new("image/jpeg", vec![0xFF, 0xD8, 0xFF]);
        let description = client(base).describe(&image).await.unwrap();
        assert_eq!(description.text, "red circle");
        assert_eq!(description.usage.total_tokens, 12);

        let (body, auth) = seen.lock().unwrap().take().expect("request captured");
        assert_eq!(auth, "Bearer sk-test");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 1024);
        let parts = &body["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,/9j/");
    }

    #[tokio::test]
    async fn describe_surfaces_upstream_status() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, r#"{"error":"rate limited"}"#) }),
        );
        let base = serve(router).await;

        let image = EmbeddedImage::new("image/jpeg", vec![1, 2, 3]);
        let err = client(base).describe(&image).await.unwrap_err();
        match err {
            ServiceError::Status { status, body } => {
                assert_eq!(status, reqwest::StatusCode::TOO_MANY_REQUESTS);
                assert!(body.contains("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn describe_without_content_is_empty() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let base = serve(router).await;

        let image = EmbeddedImage::new("image/png", vec![1]);
        let err = client(base).describe(&image).await.unwrap_err();
        assert!(matches!(err, ServiceError::Empty));
    }

    #[tokio::test]
    async fn generate_wraps_prompt_and_collects_results() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::default();
        let captured = seen.clone();
        let router = Router::new().route(
            "/images/generations",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(json!({
                        "created": 1,
                        "data": [
                            { "url": "https://cdn.example/a.png", "revised_prompt": "a red circle" },
                            { "b64_json": "ignored" }
                        ]
                    }))
                }
            }),
        );
        let base = serve(router).await;

        let results = client(base).generate("red circle", true).await.unwrap();
        assert_eq!(
            results,
            vec![GeneratedImage {
                url: "https://cdn.example/a.png".into(),
                revised_prompt: Some("a red circle".into()),
            }]
        );

        let body = seen.lock().unwrap().take().expect("request captured");
        assert_eq!(body["model"], "dall-e-3");
        assert_eq!(body["n"], 1);
        assert_eq!(body["size"], "1024x1024");
        assert_eq!(body["prompt"], literal_prompt("red circle"));
    }

    #[tokio::test]
    async fn generate_without_literal_policy_sends_text_unchanged() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::default();
        let captured = seen.clone();
        let router = Router::new().route(
            "/images/generations",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(json!({ "data": [] }))
                }
            }),
        );
        let base = serve(router).await;

        let results = client(base).generate("red circle", false).await.unwrap();
        assert!(results.is_empty());
        let body = seen.lock().unwrap().take().unwrap();
        assert_eq!(body["prompt"], "red circle");
    }

    #[tokio::test]
    async fn generate_rejects_undecodable_body() {
        let router = Router::new().route("/images/generations", post(|| async { "not json" }));
        let base = serve(router).await;

        let err = client(base).generate("x", true).await.unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(10);
        let t = truncate_for_log(&s, 5);
        assert!(t.starts_with("éé"));
        assert!(t.contains("total_len=20"));
        assert_eq!(truncate_for_log("short", 10), "short");
    }
}
