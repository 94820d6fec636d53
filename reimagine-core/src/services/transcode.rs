//! Raster format conversion.
//!
//! Decoding and encoding are CPU-bound, so [`transcode`] runs the work inside
//! `tokio::task::spawn_blocking` and only awaits the result.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::error::TranscodeError;

/// Formats the pipeline can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RasterFormat {
    #[default]
    Jpeg,
    Png,
}

impl RasterFormat {
    pub fn mime(self) -> &'static str {
        match self {
            RasterFormat::Jpeg => "image/jpeg",
            RasterFormat::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Jpeg => "jpg",
            RasterFormat::Png => "png",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            RasterFormat::Jpeg => ImageFormat::Jpeg,
            RasterFormat::Png => ImageFormat::Png,
        }
    }
}

/// Decode `input` (format sniffed from its magic bytes) and re-encode it as
/// `target` with the encoder's default settings. No resizing.
pub async fn transcode(input: bytes::Bytes, target: RasterFormat) -> Result<Vec<u8>, TranscodeError> {
    tokio::task::spawn_blocking(move || transcode_blocking(&input, target))
        .await
        .map_err(|_| TranscodeError::Worker)?
}

fn transcode_blocking(input: &[u8], target: RasterFormat) -> Result<Vec<u8>, TranscodeError> {
    let decoded = image::load_from_memory(input)?;
    // The JPEG encoder has no alpha channel.
    let decoded = match target {
        RasterFormat::Jpeg if decoded.color().has_alpha() => DynamicImage::ImageRgb8(decoded.to_rgb8()),
        _ => decoded,
    };

    let mut out = Vec::new();
    decoded.write_to(&mut Cursor::new(&mut out), target.image_format())?;
    debug!(
        width = decoded.width(),
        height = decoded.height(),
        in_bytes = input.len(),
        out_bytes = out.len(),
        ?target,
        "image transcoded"
    );
    Ok(out)
}
