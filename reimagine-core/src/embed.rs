//! Self-describing embedded images (`data:image/<fmt>;base64,<payload>`).
//!
//! The same textual-header convention is used in both directions: clients
//! submit photos this way and receive the generated picture back in it.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

const BASE64_MARKER: &str = ";base64,";

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("missing `data:` header")]
    MissingHeader,

    #[error("unsupported media type '{0}' (expected image/*)")]
    NotAnImage(String),

    #[error("payload is not base64 encoded")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("empty image payload")]
    Empty,
}

/// Decoded image bytes together with the MIME type from the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl EmbeddedImage {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// Parse a `data:` URL. The header is matched case-insensitively; the
    /// payload must be standard base64.
    pub fn parse(data_url: &str) -> Result<Self, EmbedError> {
        let data_url = data_url.trim();
        let rest = strip_prefix_ignore_case(data_url, "data:").ok_or(EmbedError::MissingHeader)?;

        let lower = rest.to_ascii_lowercase();
        let marker = lower.find(BASE64_MARKER).ok_or(EmbedError::NotBase64)?;
        let mime = lower[..marker].to_owned();
        if !mime.starts_with("image/") || mime.len() == "image/".len() {
            return Err(EmbedError::NotAnImage(mime));
        }

        let payload = &rest[marker + BASE64_MARKER.len()..];
        let bytes = STANDARD.decode(payload)?;
        if bytes.is_empty() {
            return Err(EmbedError::Empty);
        }
        Ok(Self { mime, bytes })
    }

    /// Re-encode as a `data:` URL.
    pub fn to_data_url(&self) -> String {
        encode_data_url(&self.mime, &self.bytes)
    }

    /// File extension matching the MIME type, `bin` when it is not a known
    /// raster format.
    pub fn extension(&self) -> &'static str {
        image::ImageFormat::from_mime_type(&self.mime)
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("bin")
    }
}

/// Encode raw bytes as a `data:<mime>;base64,` URL.
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime}{BASE64_MARKER}{}", STANDARD.encode(bytes))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

#[cfg(test)]
mod test {
    use super::*;

    /// Bytes covering every value plus a JPEG SOI marker up front.
    fn fixture() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.extend((0..=255u8).cycle().take(1021));
        bytes
    }

    #[test]
    fn round_trip_is_byte_exact() {
        let original = fixture();
        let url = encode_data_url("image/jpeg", &original);
        assert!(url.starts_with("data:image/jpeg;base64,"));

        let decoded = EmbeddedImage::parse(&url).expect("round trip should parse");
        assert_eq!(decoded.mime, "image/jpeg");
        assert_eq!(decoded.bytes, original);
        assert_eq!(decoded.to_data_url(), url);
    }

    #[test]
    fn header_is_case_insensitive() {
        let url = format!("DATA:Image/PNG;BASE64,{}", STANDARD.encode(b"\x89PNG"));
        let decoded = EmbeddedImage::parse(&url).unwrap();
        assert_eq!(decoded.mime, "image/png");
        assert_eq!(decoded.extension(), "png");
    }

    #[test]
    fn rejects_missing_header() {
        let err = EmbeddedImage::parse("aGVsbG8=").unwrap_err();
        assert!(matches!(err, EmbedError::MissingHeader));
    }

    #[test]
    fn rejects_non_image_media_type() {
        let err = EmbeddedImage::parse("data:text/plain;base64,aGVsbG8=").unwrap_err();
        assert!(matches!(err, EmbedError::NotAnImage(ref m) if m == "text/plain"));
    }

    #[test]
    fn rejects_non_base64_and_garbage() {
        assert!(matches!(
            EmbeddedImage::parse("data:image/jpeg,rawbytes").unwrap_err(),
            EmbedError::NotBase64
        ));
        assert!(matches!(
            EmbeddedImage::parse("data:image/jpeg;base64,@@@").unwrap_err(),
            EmbedError::Base64(_)
        ));
        assert!(matches!(
            EmbeddedImage::parse("data:image/jpeg;base64,").unwrap_err(),
            EmbedError::Empty
        ));
    }

    #[test]
    fn jpeg_extension() {
        let img = EmbeddedImage::new("image/jpeg", vec![1]);
        assert_eq!(img.extension(), "jpg");
        let unknown = EmbeddedImage::new("image/x-unknown", vec![1]);
        assert_eq!(unknown.extension(), "bin");
    }
}
