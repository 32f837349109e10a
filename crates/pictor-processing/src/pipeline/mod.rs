//! Pipeline orchestrator
//!
//! Drives one upload through sniffing, dimension checks, malware scanning,
//! sanitization and variant generation as an explicit state machine, and maps the
//! terminal state to an all-or-nothing [`PipelineResult`]. The orchestrator never
//! retries; retry policy belongs to the caller.

mod state;

pub use state::{PipelineStage, PipelineState};

use pictor_core::{
    ErrorMetadata, LogLevel, PipelineConfig, PipelineError, PipelineResult, UploadRequest,
    VariantSpec,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dimension::DimensionGuard;
use crate::governor::ConcurrencyGovernor;
use crate::sanitize::MetadataSanitizer;
use crate::scanner::{MalwareScanStage, MalwareScanner};
use crate::sniff::FormatSniffer;
use crate::variants::VariantGenerator;

pub struct ImagePipeline {
    guard: DimensionGuard,
    scan: MalwareScanStage,
    generator: VariantGenerator,
    specs: Vec<VariantSpec>,
    governor: Arc<ConcurrencyGovernor>,
}

impl ImagePipeline {
    pub fn new(
        config: &PipelineConfig,
        governor: Arc<ConcurrencyGovernor>,
        scanner: Arc<dyn MalwareScanner>,
    ) -> Self {
        Self {
            guard: DimensionGuard::from_config(config),
            scan: MalwareScanStage::from_config(scanner, config),
            generator: VariantGenerator::from_config(governor.clone(), config),
            specs: config.variants.clone(),
            governor,
        }
    }

    pub fn governor(&self) -> &Arc<ConcurrencyGovernor> {
        &self.governor
    }

    /// Process one upload to a terminal result. Cancelling `cancel` stops the run at
    /// the next await point and discards any variants produced so far.
    #[tracing::instrument(
        skip_all,
        fields(upload_id = %request.id, uploader = %request.uploader, bytes = request.data.len())
    )]
    pub async fn process(&self, request: UploadRequest, cancel: &CancellationToken) -> PipelineResult {
        let start = Instant::now();
        let upload_id = request.id;
        let uploader = request.uploader.clone();

        let mut state = PipelineState::Received(request);
        while !state.is_terminal() {
            let from = state.stage();
            state = if cancel.is_cancelled() {
                PipelineState::from_error(from, PipelineError::Cancelled)
            } else {
                match self.step(state, upload_id, &uploader, cancel).await {
                    Ok(next) => next,
                    Err(error) => PipelineState::from_error(from, error),
                }
            };
            debug_assert!(from.can_transition_to(state.stage()));
            tracing::trace!(from = %from, to = %state.stage(), "Pipeline transition");
        }

        self.finish(upload_id, state, start)
    }

    async fn step(
        &self,
        state: PipelineState,
        upload_id: Uuid,
        uploader: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineState, PipelineError> {
        match state {
            PipelineState::Received(request) => {
                let format = FormatSniffer::sniff_upload(&request)?;
                Ok(PipelineState::Sniffed { request, format })
            }
            PipelineState::Sniffed { request, format } => {
                let image = self.guard.check(&request.data, format)?;
                tracing::debug!(
                    format = %format,
                    width = image.width(),
                    height = image.height(),
                    "Upload passed dimension checks"
                );
                Ok(PipelineState::DimensionChecked {
                    data: request.data,
                    image,
                })
            }
            PipelineState::DimensionChecked { data, image } => {
                self.scan
                    .check(upload_id, uploader, data.clone(), cancel)
                    .await?;
                Ok(PipelineState::Scanned { data, image })
            }
            PipelineState::Scanned { data, image } => {
                let source = MetadataSanitizer::sanitize(image, data)?;
                Ok(PipelineState::Sanitized(source))
            }
            PipelineState::Sanitized(source) => {
                let variants = self
                    .generator
                    .generate(upload_id, &source, &self.specs, cancel)
                    .await?;
                Ok(PipelineState::VariantsGenerated(variants))
            }
            PipelineState::VariantsGenerated(variants) => {
                if variants.len() != self.specs.len() {
                    return Err(PipelineError::Internal(format!(
                        "expected {} variants, generated {}",
                        self.specs.len(),
                        variants.len()
                    )));
                }
                Ok(PipelineState::Succeeded(variants))
            }
            terminal => Ok(terminal),
        }
    }

    fn finish(&self, upload_id: Uuid, state: PipelineState, start: Instant) -> PipelineResult {
        let duration_ms = start.elapsed().as_millis() as u64;
        match state {
            PipelineState::Succeeded(variants) => {
                tracing::info!(
                    upload_id = %upload_id,
                    variants = variants.len(),
                    total_bytes = variants.iter().map(|v| v.byte_size).sum::<usize>(),
                    duration_ms,
                    "Upload processed"
                );
                PipelineResult::success(upload_id, variants)
            }
            PipelineState::Rejected { at, error } | PipelineState::Failed { at, error } => {
                log_outcome(upload_id, at, &error, duration_ms);
                PipelineResult::from_error(upload_id, &error)
            }
            other => {
                // Unreachable: the loop only exits on a terminal state
                let error = PipelineError::Internal(format!(
                    "pipeline stopped in non-terminal stage {}",
                    other.stage()
                ));
                log_outcome(upload_id, other.stage(), &error, duration_ms);
                PipelineResult::from_error(upload_id, &error)
            }
        }
    }
}

fn log_outcome(upload_id: Uuid, at: PipelineStage, error: &PipelineError, duration_ms: u64) {
    let outcome = if error.is_rejection() { "rejected" } else { "failed" };
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(
            upload_id = %upload_id,
            stage = at.step_name(),
            outcome,
            code = error.error_code(),
            error = %error,
            duration_ms,
            "Upload not processed"
        ),
        LogLevel::Warn => tracing::warn!(
            upload_id = %upload_id,
            stage = at.step_name(),
            outcome,
            code = error.error_code(),
            error = %error,
            duration_ms,
            "Upload not processed"
        ),
        LogLevel::Error => tracing::error!(
            upload_id = %upload_id,
            stage = at.step_name(),
            outcome,
            code = error.error_code(),
            error = %error,
            duration_ms,
            "Upload not processed"
        ),
    }
}
