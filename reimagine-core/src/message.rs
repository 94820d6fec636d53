//! WebSocket protocol messages.
//!
//! Both directions are closed unions tagged on a `type` field. Outbound
//! messages that belong to a session carry its identifier in `session` so a
//! client can tell overlapping sessions on one connection apart.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::staging::SessionId;

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// A photo to reimagine, as a `data:image/...;base64,` URL.
    Image { data: String },
}

/// Tags [`Inbound`] understands.
const INBOUND_TAGS: &[&str] = &["image"];

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has no `type` field")]
    MissingType,

    #[error("unknown message type '{0}'")]
    UnknownType(String),
}

#[derive(Deserialize)]
struct Tagged {
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl Inbound {
    /// Parse a text frame. Unrecognised tags are rejected with
    /// [`MessageError::UnknownType`] rather than ignored.
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let tagged: Tagged = serde_json::from_str(text)?;
        let kind = tagged.kind.ok_or(MessageError::MissingType)?;
        if !INBOUND_TAGS.contains(&kind.as_str()) {
            return Err(MessageError::UnknownType(kind));
        }
        Ok(serde_json::from_str(text)?)
    }
}

/// Which text a `description` message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionKind {
    /// Output of the vision model.
    Raw,
    /// Prompt the generation service actually used.
    Revised,
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Status {
        session: SessionId,
        body: String,
    },
    Description {
        session: SessionId,
        kind: DescriptionKind,
        body: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<SessionId>,
        body: String,
    },
    /// Final result as a `data:image/jpeg;base64,` URL.
    Image {
        session: SessionId,
        data: String,
    },
}

impl Outbound {
    pub fn session(&self) -> Option<SessionId> {
        match self {
            Outbound::Status { session, .. }
            | Outbound::Description { session, .. }
            | Outbound::Image { session, .. } => Some(*session),
            Outbound::Error { session, .. } => *session,
        }
    }

    pub fn to_json(&self) -> String {
        // Every variant is plain strings and integers.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","body":"failed to encode message: {e}"}}"#)
        })
    }
}

#[cfg(test)]
mod test {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn parses_image_message() {
        let msg = Inbound::parse(r#"{"type":"image","data":"data:image/jpeg;base64,AAAA"}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::Image {
                data: "data:image/jpeg;base64,AAAA".into()
            }
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = Inbound::parse(r#"{"type":"video","data":"x"}"#).unwrap_err();
        assert!(matches!(err, MessageError::UnknownType(ref t) if t == "video"));
        assert_eq!(err.to_string(), "unknown message type 'video'");
    }

    #[test]
    fn missing_tag_and_fields_are_reported() {
        assert!(matches!(
            Inbound::parse(r#"{"data":"x"}"#).unwrap_err(),
            MessageError::MissingType
        ));
        assert!(matches!(
            Inbound::parse(r#"{"type":"image"}"#).unwrap_err(),
            MessageError::Malformed(_)
        ));
        assert!(matches!(
            Inbound::parse("not json").unwrap_err(),
            MessageError::Malformed(_)
        ));
    }

    #[test]
    fn outbound_wire_shape() {
        let session = SessionId::from(1_700_000_000_000);
        let status: Value = serde_json::from_str(
            &Outbound::Status { session, body: "image received".into() }.to_json(),
        )
        .unwrap();
        assert_eq!(status, json!({"type":"status","session":1700000000000u64,"body":"image received"}));

        let description: Value = serde_json::from_str(
            &Outbound::Description {
                session,
                kind: DescriptionKind::Revised,
                body: "a red circle".into(),
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(description["type"], "description");
        assert_eq!(description["kind"], "revised");

        let error: Value =
            serde_json::from_str(&Outbound::Error { session: None, body: "boom".into() }.to_json()).unwrap();
        assert_eq!(error, json!({"type":"error","body":"boom"}));
    }

    #[test]
    fn session_accessor() {
        let session = SessionId::from(7);
        assert_eq!(Outbound::Image { session, data: String::new() }.session(), Some(session));
        assert_eq!(Outbound::Error { session: None, body: String::new() }.session(), None);
    }
}
