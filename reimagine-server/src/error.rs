//! Errors on the gateway's receive path.
//!
//! None of these close the connection: each one becomes an `error` message
//! for the client that sent the offending frame. Session failures are not
//! listed here; the pipeline reports those itself.

use reimagine_core::{MessageError, Outbound};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The text frame was not a valid inbound message.
    #[error(transparent)]
    Message(#[from] MessageError),

    /// The protocol is JSON over text frames only.
    #[error("binary frames are not supported; send JSON text frames")]
    BinaryFrame,
}

impl From<GatewayError> for Outbound {
    fn from(e: GatewayError) -> Self {
        warn!(error = %e, "rejected inbound frame");
        Outbound::Error {
            session: None,
            body: e.to_string(),
        }
    }
}
