use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat};
use pictor_core::{OutputFormat, PipelineError};
use std::io::Cursor;

/// AVIF encoder speed: balance between speed and compression
const AVIF_SPEED: u8 = 6;

/// Encodes one rendition. The engine holds one of these for every variant it
/// renders.
pub trait VariantEncoder: Send + Sync {
    fn encode_variant(
        &self,
        img: &DynamicImage,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Bytes, PipelineError>;
}

/// Re-encodes decoded pixels. Every output is built from raw pixel data, so no
/// container metadata from the upload can survive into a rendition.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageEncoder;

impl VariantEncoder for ImageEncoder {
    fn encode_variant(
        &self,
        img: &DynamicImage,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Bytes, PipelineError> {
        ImageEncoder::encode(img, format, quality)
    }
}

impl ImageEncoder {
    pub fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Bytes, PipelineError> {
        let quality = quality.clamp(1, 100);
        match format {
            OutputFormat::Jpeg => Self::encode_jpeg(img, quality),
            OutputFormat::Png => Self::encode_with_image(img, ImageFormat::Png),
            OutputFormat::WebP => Self::encode_webp(img, quality),
            OutputFormat::Avif => Self::encode_avif(img, quality),
            OutputFormat::Gif => {
                // The GIF encoder only accepts 8-bit RGB(A)
                let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
                Self::encode_with_image(&rgba, ImageFormat::Gif)
            }
        }
    }

    /// Progressive JPEG with optimized Huffman tables
    fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes, PipelineError> {
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(quality as f32);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let mut comp = comp
            .start_compress(Vec::new())
            .map_err(|e| PipelineError::EncodeFailed(format!("jpeg: {}", e)))?;
        comp.write_scanlines(&rgb_img)
            .map_err(|e| PipelineError::EncodeFailed(format!("jpeg: {}", e)))?;
        let jpeg_data = comp
            .finish()
            .map_err(|e| PipelineError::EncodeFailed(format!("jpeg: {}", e)))?;

        Ok(Bytes::from(jpeg_data))
    }

    fn encode_with_image(img: &DynamicImage, format: ImageFormat) -> Result<Bytes, PipelineError> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format)
            .map_err(|e| PipelineError::EncodeFailed(format!("{:?}: {}", format, e)))?;
        Ok(Bytes::from(buffer))
    }

    /// Lossy WebP, or lossless at quality 100
    fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Bytes, PipelineError> {
        let (width, height) = img.dimensions();
        let rgba_img = img.to_rgba8();

        let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
        let webp_data = if quality >= 100 {
            encoder.encode_lossless()
        } else {
            encoder.encode(quality as f32)
        };

        if webp_data.is_empty() {
            return Err(PipelineError::EncodeFailed("webp: encoder produced no data".to_string()));
        }
        Ok(Bytes::copy_from_slice(&webp_data))
    }

    fn encode_avif(img: &DynamicImage, quality: u8) -> Result<Bytes, PipelineError> {
        let (width, height) = img.dimensions();
        let encoder = ravif::Encoder::new()
            .with_quality(quality as f32)
            .with_speed(AVIF_SPEED);

        let encoded = if img.color().has_alpha() {
            let rgba_img = img.to_rgba8();
            let pixels: Vec<rgb::RGBA8> = rgba_img
                .as_raw()
                .chunks_exact(4)
                .map(|px| rgb::RGBA8::new(px[0], px[1], px[2], px[3]))
                .collect();
            encoder.encode_rgba(ravif::Img::new(pixels.as_slice(), width as usize, height as usize))
        } else {
            let rgb_img = img.to_rgb8();
            let pixels: Vec<rgb::RGB8> = rgb_img
                .as_raw()
                .chunks_exact(3)
                .map(|px| rgb::RGB8::new(px[0], px[1], px[2]))
                .collect();
            encoder.encode_rgb(ravif::Img::new(pixels.as_slice(), width as usize, height as usize))
        }
        .map_err(|e| PipelineError::EncodeFailed(format!("avif: {}", e)))?;

        Ok(Bytes::from(encoded.avif_file))
    }
}
