use pictor_core::{ImageFormat, PipelineError, UploadRequest};

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const GIF87A_MAGIC: &[u8] = b"GIF87a";
const GIF89A_MAGIC: &[u8] = b"GIF89a";
const RIFF_MAGIC: &[u8] = b"RIFF";
const WEBP_MAGIC: &[u8] = b"WEBP";

/// Identifies the true container format from leading magic bytes.
///
/// The client's filename and content type play no part in the decision.
pub struct FormatSniffer;

impl FormatSniffer {
    pub fn sniff(data: &[u8]) -> Result<ImageFormat, PipelineError> {
        if data.starts_with(JPEG_MAGIC) {
            return Ok(ImageFormat::Jpeg);
        }
        if data.starts_with(PNG_MAGIC) {
            return Ok(ImageFormat::Png);
        }
        if data.starts_with(GIF87A_MAGIC) || data.starts_with(GIF89A_MAGIC) {
            return Ok(ImageFormat::Gif);
        }
        if data.len() >= 12 && &data[0..4] == RIFF_MAGIC && &data[8..12] == WEBP_MAGIC {
            return Ok(ImageFormat::WebP);
        }
        Err(PipelineError::UnsupportedFormat)
    }

    /// Sniff an upload and record, for forensics, when the client's claim disagrees
    /// with the bytes.
    pub fn sniff_upload(request: &UploadRequest) -> Result<ImageFormat, PipelineError> {
        let format = Self::sniff(&request.data)?;
        if !format.matches_claim(&request.claimed_filename, &request.claimed_content_type) {
            tracing::debug!(
                upload_id = %request.id,
                sniffed = %format,
                claimed_filename = %request.claimed_filename,
                claimed_content_type = %request.claimed_content_type,
                "Claimed file type does not match content"
            );
        }
        Ok(format)
    }
}
