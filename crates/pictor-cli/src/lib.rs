use pictor_core::PipelineError;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the CLI. Logs go to stderr so stdout stays parseable.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Content type a client would claim for this file name. Only used as the
/// untrusted claim on the upload; the pipeline sniffs the real format.
pub fn claimed_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Compare a file's on-disk length with the upload limit, so oversized files are
/// refused before any of their bytes are read.
pub fn ensure_within_upload_limit(len: u64, max_bytes: usize) -> Result<(), PipelineError> {
    let size = usize::try_from(len).unwrap_or(usize::MAX);
    if size > max_bytes {
        return Err(PipelineError::FileTooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}

/// File name without any directory components.
pub fn claimed_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}
