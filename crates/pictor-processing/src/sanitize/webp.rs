use bytes::Bytes;
use img_parts::riff::{RiffChunk, RiffContent};
use img_parts::webp::WebP;
use pictor_core::PipelineError;

/// Bitstream, alpha, animation and color chunks. EXIF, XMP and unknown chunks are
/// dropped.
const KEPT_CHUNKS: &[&[u8; 4]] = &[b"VP8 ", b"VP8L", b"VP8X", b"ALPH", b"ANIM", b"ANMF", b"ICCP"];

/// VP8X feature flags announcing EXIF and XMP chunks
const VP8X_EXIF_FLAG: u8 = 0x08;
const VP8X_XMP_FLAG: u8 = 0x04;

fn keep_chunk(chunk: &RiffChunk) -> bool {
    let id = chunk.id();
    KEPT_CHUNKS.iter().any(|k| **k == id)
}

/// The extended header must not advertise metadata chunks that are gone.
fn clear_metadata_flags(chunk: &mut RiffChunk) {
    if chunk.id() != *b"VP8X" {
        return;
    }
    if let RiffContent::Data(data) = chunk.content_mut() {
        let Some(&flags) = data.first() else {
            return;
        };
        let cleared = flags & !(VP8X_EXIF_FLAG | VP8X_XMP_FLAG);
        if cleared != flags {
            let mut header = data.to_vec();
            header[0] = cleared;
            *data = Bytes::from(header);
        }
    }
}

pub(super) fn strip(data: Bytes) -> Result<Bytes, PipelineError> {
    let mut webp = WebP::from_bytes(data)
        .map_err(|e| PipelineError::DecodeFailed(format!("webp container: {}", e)))?;
    webp.chunks_mut().retain(keep_chunk);
    webp.chunks_mut().iter_mut().for_each(clear_metadata_flags);
    Ok(webp.encoder().bytes())
}
