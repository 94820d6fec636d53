use thiserror::Error;

use crate::embed::EmbedError;
use crate::staging::SessionId;

/// Failure of a call to an upstream HTTP service (vision, generation or the
/// generated-image download).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request never produced a response (DNS, TLS, connection reset…).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status. `body` is kept verbatim.
    #[error("service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("failed to decode service response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response decoded but carried nothing usable.
    #[error("service returned an empty response")]
    Empty,
}

/// Raster conversion failure.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("transcode worker panicked")]
    Worker,
}

/// Errors that abort a session. Staging (disk) failures never appear here:
/// they are reported to the client and the session carries on in memory.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid image payload: {0}")]
    Decode(#[from] EmbedError),

    #[error("image description failed: {0}")]
    Description(#[source] ServiceError),

    #[error("image generation failed: {0}")]
    Generation(#[source] ServiceError),

    #[error("image generation returned no results")]
    NoGenerationResults,

    #[error("downloading generated image failed: {0}")]
    Fetch(#[source] ServiceError),

    #[error("transcoding generated image failed: {0}")]
    Transcode(#[from] TranscodeError),
}

/// A [`PipelineError`] tagged with the session it aborted.
#[derive(Debug, Error)]
#[error("session {session} aborted: {source}")]
pub struct SessionError {
    pub session: SessionId,
    #[source]
    pub source: PipelineError,
}
