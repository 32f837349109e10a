use bytes::Bytes;
use img_parts::png::{Png, PngChunk};
use pictor_core::PipelineError;

/// Ancillary chunks that affect how pixels render. Every other ancillary chunk
/// (eXIf, tEXt, zTXt, iTXt, tIME, private chunks) is dropped.
const KEPT_ANCILLARY: &[&[u8; 4]] = &[
    b"tRNS", b"gAMA", b"cHRM", b"sRGB", b"iCCP", b"cICP", b"sBIT", b"bKGD", b"pHYs", b"acTL",
    b"fcTL", b"fdAT",
];

fn keep_chunk(chunk: &PngChunk) -> bool {
    let kind = chunk.kind();
    // Uppercase first letter marks a critical chunk (IHDR, PLTE, IDAT, IEND)
    kind[0].is_ascii_uppercase() || KEPT_ANCILLARY.iter().any(|k| **k == kind)
}

pub(super) fn strip(data: Bytes) -> Result<Bytes, PipelineError> {
    let mut png = Png::from_bytes(data)
        .map_err(|e| PipelineError::DecodeFailed(format!("png container: {}", e)))?;
    png.chunks_mut().retain(keep_chunk);
    Ok(png.encoder().bytes())
}
