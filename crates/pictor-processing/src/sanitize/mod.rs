//! Metadata sanitization
//!
//! Rewrites the container of a validated upload so that no EXIF, GPS, XMP, IPTC,
//! comment or maker-specific block survives, without touching compressed pixel
//! data. Each format keeps a whitelist of structural and color-relevant blocks and
//! drops everything else. Running the sanitizer on its own output is a no-op.

mod gif;
mod jpeg;
mod png;
mod webp;

use bytes::Bytes;
use pictor_core::{ImageFormat, PipelineError};

use crate::dimension::{read_header_dimensions, ValidatedImage};
use crate::orientation::Orientation;

/// A validated image whose container carries no identifying metadata.
///
/// Only [`MetadataSanitizer::sanitize`] builds one.
#[derive(Debug, Clone)]
pub struct SanitizedImage {
    image: ValidatedImage,
    data: Bytes,
    orientation: Orientation,
}

impl SanitizedImage {
    pub fn image(&self) -> &ValidatedImage {
        &self.image
    }

    pub fn format(&self) -> ImageFormat {
        self.image.format()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// EXIF orientation read before the EXIF block was removed
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }
}

pub struct MetadataSanitizer;

impl MetadataSanitizer {
    pub fn sanitize(image: ValidatedImage, data: Bytes) -> Result<SanitizedImage, PipelineError> {
        let format = image.format();
        let orientation = match format {
            ImageFormat::Gif => Orientation::NORMAL,
            _ => Orientation::read_from(&data),
        };

        let original_len = data.len();
        let cleaned = Self::strip(data, format)?;

        let (width, height) = read_header_dimensions(&cleaned, format).map_err(|e| {
            PipelineError::DecodeFailed(format!("sanitized {} unreadable: {}", format, e))
        })?;
        if (width, height) != (image.width(), image.height()) {
            return Err(PipelineError::DecodeFailed(format!(
                "sanitized {} changed dimensions from {}x{} to {}x{}",
                format,
                image.width(),
                image.height(),
                width,
                height
            )));
        }

        tracing::debug!(
            format = %format,
            original_bytes = original_len,
            sanitized_bytes = cleaned.len(),
            orientation = orientation.value(),
            "Stripped image metadata"
        );

        Ok(SanitizedImage {
            image,
            data: cleaned,
            orientation,
        })
    }

    /// Remove metadata blocks from a container of the given format.
    pub fn strip(data: Bytes, format: ImageFormat) -> Result<Bytes, PipelineError> {
        match format {
            ImageFormat::Jpeg => jpeg::strip(data),
            ImageFormat::Png => png::strip(data),
            ImageFormat::WebP => webp::strip(data),
            ImageFormat::Gif => gif::strip(&data),
        }
    }
}
