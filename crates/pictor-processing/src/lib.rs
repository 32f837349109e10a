//! Pictor Processing Library
//!
//! The image ingestion pipeline: format sniffing, header-only dimension checks,
//! malware scanning, metadata sanitization and variant generation, all decode and
//! encode work running on slots handed out by the [`ConcurrencyGovernor`].

pub mod compression;
pub mod dimension;
pub mod engine;
pub mod governor;
pub mod orientation;
pub mod pipeline;
pub mod resize;
pub mod sanitize;
pub mod scanner;
pub mod sniff;
pub mod variants;

pub use compression::{ImageEncoder, VariantEncoder};
pub use dimension::{DimensionGuard, ValidatedImage};
pub use engine::ImageEngine;
pub use governor::{ConcurrencyGovernor, GovernorConfig, SlotPermit};
pub use orientation::Orientation;
pub use pipeline::{ImagePipeline, PipelineStage, PipelineState};
pub use sanitize::{MetadataSanitizer, SanitizedImage};
pub use scanner::{MalwareScanStage, MalwareScanner, ScanVerdict};
pub use sniff::FormatSniffer;
pub use variants::VariantGenerator;
