use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ErrorMetadata, PipelineError};
use crate::models::variant::GeneratedVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Success,
    /// The input itself was unacceptable
    Rejected,
    /// The system could not finish processing an input that may be fine
    Failed,
}

/// Terminal outcome of one pipeline run.
///
/// Either every configured rendition is present (`Success`) or none is. The
/// constructors are the only way to build a result, so a rejected or failed run can
/// never leak partial variants.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    upload_id: Uuid,
    status: PipelineStatus,
    reason: Option<String>,
    error_code: Option<&'static str>,
    retryable: bool,
    variants: Vec<GeneratedVariant>,
    finished_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn success(upload_id: Uuid, variants: Vec<GeneratedVariant>) -> Self {
        Self {
            upload_id,
            status: PipelineStatus::Success,
            reason: None,
            error_code: None,
            retryable: false,
            variants,
            finished_at: Utc::now(),
        }
    }

    /// Build a rejected or failed result, depending on the error's classification.
    /// The reason is the sanitized client message, never the internal detail.
    pub fn from_error(upload_id: Uuid, error: &PipelineError) -> Self {
        let status = if error.is_rejection() {
            PipelineStatus::Rejected
        } else {
            PipelineStatus::Failed
        };
        Self {
            upload_id,
            status,
            reason: Some(error.client_message()),
            error_code: Some(error.error_code()),
            retryable: error.is_recoverable(),
            variants: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    pub fn upload_id(&self) -> Uuid {
        self.upload_id
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Success
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn error_code(&self) -> Option<&'static str> {
        self.error_code
    }

    /// Whether the caller's retry policy may resubmit this upload
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn variants(&self) -> &[GeneratedVariant] {
        &self.variants
    }
}
