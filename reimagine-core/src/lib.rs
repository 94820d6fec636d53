//! reimagine-core – photo → description → generated image pipeline.
//!
//! The server crate owns the transport; everything a session does lives
//! here: the wire messages, the embedded-image codec, per-session staging,
//! the upstream service capabilities and the [`Pipeline`] that sequences
//! them.

pub mod embed;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod services;
pub mod staging;

#[cfg(test)]
mod testing;

pub use embed::{EmbedError, EmbeddedImage};
pub use error::{PipelineError, ServiceError, SessionError, TranscodeError};
pub use message::{DescriptionKind, Inbound, MessageError, Outbound};
pub use pipeline::{Pipeline, PipelineConfig, SessionOutcome};
pub use staging::{Artifact, SessionDir, SessionId, Staging};
