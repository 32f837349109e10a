use image::{ImageError, ImageReader};
use pictor_core::{ImageFormat, PipelineConfig, PipelineError};
use std::io::Cursor;

use crate::engine::codec_format;

/// An input that passed every pre-decode check.
///
/// Only [`DimensionGuard::check`] builds one, so code holding a `ValidatedImage`
/// knows the size, dimension and pixel-count ceilings already hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedImage {
    format: ImageFormat,
    width: u32,
    height: u32,
    pixel_count: u64,
    byte_size: usize,
}

impl ValidatedImage {
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> u64 {
        self.pixel_count
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }
}

/// Rejects oversized files and decompression bombs using header metadata only.
///
/// Checks run cheapest first: byte size, then the pixel count, then each edge. The
/// pixel buffer is never allocated here.
#[derive(Debug, Clone)]
pub struct DimensionGuard {
    max_file_size_bytes: usize,
    max_dimension: u32,
    max_pixels: u64,
}

impl DimensionGuard {
    pub fn new(max_file_size_bytes: usize, max_dimension: u32, max_pixels: u64) -> Self {
        Self {
            max_file_size_bytes,
            max_dimension,
            max_pixels,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.max_file_size_bytes,
            config.max_dimension,
            config.max_pixels,
        )
    }

    pub fn check(&self, data: &[u8], format: ImageFormat) -> Result<ValidatedImage, PipelineError> {
        if data.len() > self.max_file_size_bytes {
            return Err(PipelineError::FileTooLarge {
                size: data.len(),
                max: self.max_file_size_bytes,
            });
        }

        let (width, height) = match read_header_dimensions(data, format) {
            Ok(dims) => dims,
            // The codec refused the header on allocation grounds
            Err(ImageError::Limits(e)) => {
                tracing::warn!(format = %format, error = %e, "Image header rejected by codec limits");
                return Err(PipelineError::PixelBombSuspected {
                    pixels: u64::MAX,
                    max: self.max_pixels,
                });
            }
            Err(e) => {
                return Err(PipelineError::DecodeFailed(format!(
                    "unreadable {} header: {}",
                    format, e
                )))
            }
        };

        if width == 0 || height == 0 {
            return Err(PipelineError::DecodeFailed(format!(
                "{} header declares an empty image ({}x{})",
                format, width, height
            )));
        }

        let pixel_count = u64::from(width) * u64::from(height);
        if pixel_count > self.max_pixels {
            return Err(PipelineError::PixelBombSuspected {
                pixels: pixel_count,
                max: self.max_pixels,
            });
        }

        if width > self.max_dimension || height > self.max_dimension {
            return Err(PipelineError::DimensionExceeded {
                width,
                height,
                max: self.max_dimension,
            });
        }

        Ok(ValidatedImage {
            format,
            width,
            height,
            pixel_count,
            byte_size: data.len(),
        })
    }
}

/// Width and height as declared by the container header.
pub(crate) fn read_header_dimensions(
    data: &[u8],
    format: ImageFormat,
) -> Result<(u32, u32), ImageError> {
    ImageReader::with_format(Cursor::new(data), codec_format(format)).into_dimensions()
}
