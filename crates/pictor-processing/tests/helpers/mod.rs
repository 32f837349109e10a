#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::png::{Png, PngChunk};
use img_parts::ImageEXIF;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{DynamicImage, Frame};
use pictor_core::{FailurePolicy, OutputFormat, PipelineConfig, PipelineError};
use pictor_processing::{
    ConcurrencyGovernor, GovernorConfig, ImageEncoder, ImagePipeline, MalwareScanner,
    ScanVerdict, VariantEncoder,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const EICAR: &[u8] =
    br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

/// Gradient JPEG so the encoder has real detail to work with
pub fn jpeg_bytes(width: u32, height: u32) -> Bytes {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    Bytes::from(buf)
}

pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = RgbaImage::from_pixel(width, height, Rgba([40, 80, 120, 255]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    Bytes::from(buf)
}

/// Two-frame looping GIF
pub fn gif_bytes(width: u32, height: u32) -> Bytes {
    let frames = [Rgba([200, 30, 30, 255]), Rgba([30, 30, 200, 255])]
        .into_iter()
        .map(|color| Frame::new(RgbaImage::from_pixel(width, height, color)));
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        encoder.encode_frames(frames).unwrap();
    }
    Bytes::from(buf)
}

pub fn webp_bytes(width: u32, height: u32) -> Bytes {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255])
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)
        .unwrap();
    Bytes::from(buf)
}

/// Little-endian TIFF block with an orientation tag and a GPS IFD holding a
/// latitude reference.
pub fn exif_with_gps(orientation: u16) -> Bytes {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II*\x00");
    tiff.extend_from_slice(&8u32.to_le_bytes());

    // IFD0 at offset 8: two entries
    tiff.extend_from_slice(&2u16.to_le_bytes());
    // Orientation, SHORT, count 1, value inline
    tiff.extend_from_slice(&0x0112u16.to_le_bytes());
    tiff.extend_from_slice(&3u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&orientation.to_le_bytes());
    tiff.extend_from_slice(&[0, 0]);
    // GPSInfo pointer, LONG, count 1, offset of the GPS IFD
    tiff.extend_from_slice(&0x8825u16.to_le_bytes());
    tiff.extend_from_slice(&4u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&38u32.to_le_bytes());
    // Next IFD: none
    tiff.extend_from_slice(&0u32.to_le_bytes());

    // GPS IFD at offset 38: GPSLatitudeRef = "N"
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x0001u16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&2u32.to_le_bytes());
    tiff.extend_from_slice(b"N\x00\x00\x00");
    tiff.extend_from_slice(&0u32.to_le_bytes());

    Bytes::from(tiff)
}

pub fn jpeg_with_exif(width: u32, height: u32, orientation: u16) -> Bytes {
    let mut jpeg = Jpeg::from_bytes(jpeg_bytes(width, height)).unwrap();
    jpeg.set_exif(Some(exif_with_gps(orientation)));
    jpeg.encoder().bytes()
}

/// A valid JPEG carrying the EICAR test string in a comment segment
pub fn jpeg_with_eicar() -> Bytes {
    let mut jpeg = Jpeg::from_bytes(jpeg_bytes(64, 64)).unwrap();
    let comment = JpegSegment::new_with_contents(0xFE, Bytes::from_static(EICAR));
    jpeg.segments_mut().insert(1, comment);
    jpeg.encoder().bytes()
}

pub fn has_gps(data: &[u8]) -> bool {
    match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif) => exif.fields().any(|f| f.tag == exif::Tag::GPSLatitudeRef),
        Err(_) => false,
    }
}

pub fn has_exif(data: &[u8]) -> bool {
    exif::Reader::new()
        .read_from_container(&mut Cursor::new(data))
        .is_ok()
}

/// A PNG whose header declares `width` x `height` RGB pixels, followed by a block
/// of filler IDAT data. Decoding it fully would need width * height * 3 bytes.
pub fn png_header_only(width: u32, height: u32, filler: usize) -> Bytes {
    let mut png = Png::from_bytes(png_bytes(1, 1)).unwrap();
    let mut ihdr = png.chunk_by_type(*b"IHDR").unwrap().contents().to_vec();
    ihdr[..4].copy_from_slice(&width.to_be_bytes());
    ihdr[4..8].copy_from_slice(&height.to_be_bytes());
    // 8-bit truecolor
    ihdr[8] = 8;
    ihdr[9] = 2;

    let chunks = png.chunks_mut();
    chunks.clear();
    chunks.push(PngChunk::new(*b"IHDR", Bytes::from(ihdr)));
    chunks.push(PngChunk::new(*b"IDAT", Bytes::from(vec![0u8; filler])));
    chunks.push(PngChunk::new(*b"IEND", Bytes::new()));
    png.encoder().bytes()
}

pub struct CleanScanner {
    pub calls: AtomicUsize,
}

impl CleanScanner {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MalwareScanner for CleanScanner {
    async fn scan(&self, _data: Bytes) -> ScanVerdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ScanVerdict::Clean
    }

    fn name(&self) -> &'static str {
        "clean"
    }
}

/// Flags any buffer containing the EICAR test string
pub struct EicarScanner;

#[async_trait]
impl MalwareScanner for EicarScanner {
    async fn scan(&self, data: Bytes) -> ScanVerdict {
        let marker = b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE";
        if data.windows(marker.len()).any(|w| w == marker) {
            ScanVerdict::Infected("Eicar-Test-Signature".to_string())
        } else {
            ScanVerdict::Clean
        }
    }

    fn name(&self) -> &'static str {
        "eicar"
    }
}

pub struct UnavailableScanner;

#[async_trait]
impl MalwareScanner for UnavailableScanner {
    async fn scan(&self, _data: Bytes) -> ScanVerdict {
        ScanVerdict::Unavailable("connection refused".to_string())
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

pub struct HangingScanner;

#[async_trait]
impl MalwareScanner for HangingScanner {
    async fn scan(&self, _data: Bytes) -> ScanVerdict {
        std::future::pending::<ScanVerdict>().await
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}

pub fn test_config(slots: usize) -> PipelineConfig {
    PipelineConfig {
        worker_slots: slots,
        decode_timeout_secs: 120,
        variant_timeout_secs: 120,
        clamav_timeout_secs: 60,
        malware_scan_policy: FailurePolicy::FailClosed,
        ..Default::default()
    }
}

pub fn build_pipeline(
    config: &PipelineConfig,
    scanner: Arc<dyn MalwareScanner>,
) -> (ImagePipeline, Arc<ConcurrencyGovernor>) {
    build_pipeline_with_encoder(config, scanner, Arc::new(ImageEncoder))
}

pub fn build_pipeline_with_encoder(
    config: &PipelineConfig,
    scanner: Arc<dyn MalwareScanner>,
    encoder: Arc<dyn VariantEncoder>,
) -> (ImagePipeline, Arc<ConcurrencyGovernor>) {
    let governor = Arc::new(ConcurrencyGovernor::with_encoder(
        GovernorConfig::from_pipeline_config(config),
        encoder,
    ));
    let pipeline = ImagePipeline::new(config, governor.clone(), scanner);
    (pipeline, governor)
}

/// Real encoder behind a fixed delay, optionally failing one output format after
/// a delay of its own.
pub struct ScriptedEncoder {
    delay: Duration,
    fail: Option<(OutputFormat, Duration)>,
    calls: AtomicUsize,
}

impl ScriptedEncoder {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            fail: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(format: OutputFormat, after: Duration) -> Self {
        Self {
            fail: Some((format, after)),
            ..Self::slow(Duration::ZERO)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VariantEncoder for ScriptedEncoder {
    fn encode_variant(
        &self,
        img: &DynamicImage,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Bytes, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if let Some((failing, after)) = self.fail {
            if failing == format {
                std::thread::sleep(after);
                return Err(PipelineError::EncodeFailed(format!("{} encoder crashed", format)));
            }
        }
        ImageEncoder.encode_variant(img, format, quality)
    }
}
