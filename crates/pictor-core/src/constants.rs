//! Default limits shared by the configuration layer and tests.

/// 10 MiB upload ceiling
pub const DEFAULT_MAX_FILE_SIZE_MB: usize = 10;

/// Longest accepted edge, in pixels
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 8192;

/// Pixel-count ceiling (width * height) used to detect decompression bombs
pub const DEFAULT_MAX_IMAGE_PIXELS: u64 = 100_000_000;

pub const DEFAULT_WORKER_SLOTS: usize = 32;
pub const DEFAULT_CACHE_MAX_MB: usize = 256;
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SLOT_WAIT_SECS: u64 = 10;
pub const DEFAULT_DECODE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_VARIANT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 30;

/// Default rendition table: `name:max_dimension:format:quality`
pub const DEFAULT_VARIANTS: &str = "thumbnail:160:webp:80,small:320:webp:80,medium:800:webp:82,large:1600:jpeg:85,original:8192:source:100";

/// Key prefix under which generated renditions are suggested to be stored
pub const VARIANT_KEY_PREFIX: &str = "images";

pub const BYTES_PER_MB: usize = 1024 * 1024;
