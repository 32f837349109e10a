use bytes::Bytes;
use img_parts::jpeg::{Jpeg, JpegSegment};
use pictor_core::PipelineError;

const APP0: u8 = 0xE0;
const APP2: u8 = 0xE2;
const APP14: u8 = 0xEE;
const APP15: u8 = 0xEF;
const COM: u8 = 0xFE;

const ICC_PROFILE_ID: &[u8] = b"ICC_PROFILE\0";
const ADOBE_ID: &[u8] = b"Adobe";

/// APPn and COM segments are dropped, except the ICC profile (APP2) and the Adobe
/// color-transform segment (APP14), which decoders need to render colors correctly.
fn keep_segment(segment: &JpegSegment) -> bool {
    let marker = segment.marker();
    match marker {
        COM => false,
        APP2 => segment.contents().starts_with(ICC_PROFILE_ID),
        APP14 => segment.contents().starts_with(ADOBE_ID),
        APP0..=APP15 => false,
        _ => true,
    }
}

pub(super) fn strip(data: Bytes) -> Result<Bytes, PipelineError> {
    let mut jpeg = Jpeg::from_bytes(data)
        .map_err(|e| PipelineError::DecodeFailed(format!("jpeg container: {}", e)))?;
    jpeg.segments_mut().retain(keep_segment);
    Ok(jpeg.encoder().bytes())
}
