//! GIF block walker. GIF metadata lives in extension blocks: comments (0xFE),
//! plain text (0x01) and application extensions (0xFF, which is where XMP goes).
//! Only the animation-loop application blocks are kept.

use bytes::Bytes;
use pictor_core::PipelineError;

const HEADER_LEN: usize = 6;
const SCREEN_DESCRIPTOR_LEN: usize = 7;
const IMAGE_DESCRIPTOR_LEN: usize = 9;

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

const PLAIN_TEXT_LABEL: u8 = 0x01;
const COMMENT_LABEL: u8 = 0xFE;
const APPLICATION_LABEL: u8 = 0xFF;

const KEPT_APPLICATIONS: &[&[u8]] = &[b"NETSCAPE2.0", b"ANIMEXTS1.0"];

fn truncated() -> PipelineError {
    PipelineError::DecodeFailed("gif container: truncated block".to_string())
}

struct Walker<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Walker<'a> {
    fn byte(&self, at: usize) -> Result<u8, PipelineError> {
        self.data.get(at).copied().ok_or_else(truncated)
    }

    /// End offset of a sub-block chain starting at `start`, past its terminator.
    fn sub_blocks_end(&self, start: usize) -> Result<usize, PipelineError> {
        let mut at = start;
        loop {
            let len = self.byte(at)? as usize;
            at += 1;
            if len == 0 {
                return Ok(at);
            }
            at += len;
            if at > self.data.len() {
                return Err(truncated());
            }
        }
    }

    fn color_table_len(packed: u8) -> usize {
        if packed & 0x80 != 0 {
            3 * (1usize << ((packed & 0x07) + 1))
        } else {
            0
        }
    }
}

pub(super) fn strip(data: &[u8]) -> Result<Bytes, PipelineError> {
    let mut walker = Walker { data, pos: 0 };
    let mut out = Vec::with_capacity(data.len());

    let screen_end = HEADER_LEN + SCREEN_DESCRIPTOR_LEN;
    let packed = walker.byte(HEADER_LEN + 4)?;
    let prelude_end = screen_end + Walker::color_table_len(packed);
    if prelude_end > data.len() {
        return Err(truncated());
    }
    out.extend_from_slice(&data[..prelude_end]);
    walker.pos = prelude_end;

    loop {
        let start = walker.pos;
        match walker.byte(start)? {
            EXTENSION_INTRODUCER => {
                let label = walker.byte(start + 1)?;
                let end = walker.sub_blocks_end(start + 2)?;
                let keep = match label {
                    COMMENT_LABEL | PLAIN_TEXT_LABEL => false,
                    APPLICATION_LABEL => {
                        let id_len = walker.byte(start + 2)? as usize;
                        let id_start = start + 3;
                        data.get(id_start..id_start + id_len)
                            .map(|id| KEPT_APPLICATIONS.contains(&id))
                            .unwrap_or(false)
                    }
                    _ => true,
                };
                if keep {
                    out.extend_from_slice(&data[start..end]);
                }
                walker.pos = end;
            }
            IMAGE_SEPARATOR => {
                let packed = walker.byte(start + IMAGE_DESCRIPTOR_LEN)?;
                // Descriptor, optional local color table, LZW minimum code size
                let lzw_at = start + 1 + IMAGE_DESCRIPTOR_LEN + Walker::color_table_len(packed);
                walker.byte(lzw_at)?;
                let end = walker.sub_blocks_end(lzw_at + 1)?;
                out.extend_from_slice(&data[start..end]);
                walker.pos = end;
            }
            TRAILER => {
                // Anything after the trailer is dropped
                out.push(TRAILER);
                return Ok(Bytes::from(out));
            }
            other => {
                return Err(PipelineError::DecodeFailed(format!(
                    "gif container: unexpected block 0x{:02X}",
                    other
                )))
            }
        }
    }
}
