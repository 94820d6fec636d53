use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use super::FetchImage;
use crate::error::ServiceError;

/// Downloads generated images over plain HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchImage for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, ServiceError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "image download failed");
            return Err(ServiceError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        debug!(bytes = bytes.len(), "image downloaded");
        Ok(bytes)
    }
}
