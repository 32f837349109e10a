//! Pictor Storage Library
//!
//! Storage abstraction for generated image variants, plus a local filesystem
//! backend.
//!
//! # Storage key format
//!
//! Variant keys are `images/{upload_id}/{variant}.{ext}`. Keys must not contain
//! `..` or a leading `/`.

pub mod local;
pub mod traits;

pub use local::LocalStorage;
pub use traits::{Storage, StorageError, StorageResult};
