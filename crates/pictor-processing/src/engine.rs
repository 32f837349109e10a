//! Decode/encode engine and its decoded-source cache.
//!
//! The engine is only reachable through [`crate::ConcurrencyGovernor::run_blocking`],
//! which hands it to work running on an acquired slot. Its cache is the one piece of
//! process-wide image memory: it is bounded by a byte ceiling independent of the
//! slot count, and the governor's background sweep drops it wholesale.

use image::{DynamicImage, ImageReader, Limits};
use lru::LruCache;
use pictor_core::{GeneratedVariant, ImageFormat, PipelineError, VariantSpec};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::compression::VariantEncoder;
use crate::resize::resize_to_fit;
use crate::sanitize::SanitizedImage;

/// Bytes the decoder may allocate per pixel (RGBA16, the widest layout it produces)
const DECODE_BYTES_PER_PIXEL: u64 = 8;

pub(crate) fn codec_format(format: ImageFormat) -> image::ImageFormat {
    match format {
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Gif => image::ImageFormat::Gif,
        ImageFormat::WebP => image::ImageFormat::WebP,
    }
}

fn image_footprint(img: &DynamicImage) -> usize {
    img.as_bytes().len()
}

/// LRU of decoded sources keyed by upload, bounded by total pixel bytes.
struct DecodeCache {
    entries: LruCache<Uuid, Arc<DynamicImage>>,
    bytes: usize,
    max_bytes: usize,
}

impl DecodeCache {
    fn new(max_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            bytes: 0,
            max_bytes,
        }
    }

    fn get(&mut self, key: &Uuid) -> Option<Arc<DynamicImage>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: Uuid, img: Arc<DynamicImage>) {
        let size = image_footprint(&img);
        if size > self.max_bytes {
            tracing::debug!(upload_id = %key, size, max = self.max_bytes, "Decoded image larger than cache ceiling, not cached");
            return;
        }
        if let Some(old) = self.entries.pop(&key) {
            self.bytes -= image_footprint(&old);
        }
        while self.bytes + size > self.max_bytes {
            match self.entries.pop_lru() {
                Some((evicted, old)) => {
                    self.bytes -= image_footprint(&old);
                    tracing::debug!(upload_id = %evicted, "Evicted decoded image from cache");
                }
                None => break,
            }
        }
        self.bytes += size;
        self.entries.put(key, img);
    }

    fn remove(&mut self, key: &Uuid) -> bool {
        match self.entries.pop(key) {
            Some(old) => {
                self.bytes -= image_footprint(&old);
                true
            }
            None => false,
        }
    }

    /// Drop every entry and the table's backing allocation.
    fn clear(&mut self) -> usize {
        let freed = self.bytes;
        self.entries = LruCache::unbounded();
        self.bytes = 0;
        freed
    }
}

pub struct ImageEngine {
    cache: Mutex<DecodeCache>,
    encoder: Arc<dyn VariantEncoder>,
    max_dimension: u32,
    max_alloc: u64,
    decodes: AtomicU64,
    encodes: AtomicU64,
}

impl ImageEngine {
    pub fn new(
        max_dimension: u32,
        max_pixels: u64,
        cache_max_bytes: usize,
        encoder: Arc<dyn VariantEncoder>,
    ) -> Self {
        Self {
            cache: Mutex::new(DecodeCache::new(cache_max_bytes)),
            encoder,
            max_dimension,
            max_alloc: max_pixels.saturating_mul(DECODE_BYTES_PER_PIXEL),
            decodes: AtomicU64::new(0),
            encodes: AtomicU64::new(0),
        }
    }

    /// Number of full pixel decodes performed since start
    pub fn decode_count(&self) -> u64 {
        self.decodes.load(Ordering::Relaxed)
    }

    pub fn encode_count(&self) -> u64 {
        self.encodes.load(Ordering::Relaxed)
    }

    /// Bytes currently held by cached decoded sources
    pub fn cache_bytes(&self) -> usize {
        self.lock_cache().bytes
    }

    pub fn cached_entries(&self) -> usize {
        self.lock_cache().entries.len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, DecodeCache> {
        // Cache contents stay consistent across a panicking holder: every mutation
        // updates `bytes` and `entries` together before returning.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decode a sanitized source (upright, per its EXIF orientation), reusing the
    /// cached copy for `key` when present.
    pub(crate) fn decode_source(
        &self,
        key: Uuid,
        source: &SanitizedImage,
    ) -> Result<Arc<DynamicImage>, PipelineError> {
        if let Some(img) = self.lock_cache().get(&key) {
            return Ok(img);
        }

        let img = self.decode(source.data(), source.format())?;
        let img = Arc::new(source.orientation().apply(img));
        self.lock_cache().insert(key, img.clone());
        Ok(img)
    }

    fn decode(&self, data: &[u8], format: ImageFormat) -> Result<DynamicImage, PipelineError> {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits.max_alloc = Some(self.max_alloc);

        let mut reader = ImageReader::with_format(Cursor::new(data), codec_format(format));
        reader.limits(limits);

        self.decodes.fetch_add(1, Ordering::Relaxed);
        reader
            .decode()
            .map_err(|e| PipelineError::DecodeFailed(format!("{}: {}", format, e)))
    }

    /// Resize and re-encode one rendition.
    pub(crate) fn render(
        &self,
        img: &DynamicImage,
        spec: &VariantSpec,
        source_format: ImageFormat,
    ) -> Result<GeneratedVariant, PipelineError> {
        let resized = resize_to_fit(img, spec.max_dimension);
        let target = resized.as_ref().unwrap_or(img);
        let format = spec.target_format.resolve(source_format);

        let encoded = self.encoder.encode_variant(target, format, spec.quality)?;
        self.encodes.fetch_add(1, Ordering::Relaxed);

        Ok(GeneratedVariant::new(
            spec.name.clone(),
            target.width(),
            target.height(),
            format,
            encoded,
        ))
    }

    pub(crate) fn evict(&self, key: &Uuid) -> bool {
        self.lock_cache().remove(key)
    }

    /// Drop every cached source; returns the bytes released.
    pub(crate) fn sweep(&self) -> usize {
        self.lock_cache().clear()
    }
}
