//! Pictor Core Library
//!
//! This crate provides the domain models, error types and configuration shared by
//! every Pictor component: the processing pipeline, the scanner adapters, the
//! storage writer and the upload job queue.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{FailurePolicy, PipelineConfig};
pub use error::{ErrorMetadata, LogLevel, PipelineError};
pub use models::{
    GeneratedVariant, ImageFormat, OutputFormat, PipelineResult, PipelineStatus, TargetFormat,
    UploadRequest, VariantSpec,
};
