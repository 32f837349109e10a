pub mod format;
pub mod result;
pub mod upload;
pub mod variant;

pub use format::{ImageFormat, OutputFormat, TargetFormat};
pub use result::{PipelineResult, PipelineStatus};
pub use upload::UploadRequest;
pub use variant::{GeneratedVariant, VariantSpec};
