//! Pictor Services Library
//!
//! Adapters for the external services the pipeline depends on.

pub mod clamav;

pub use clamav::ClamAVScanner;
