use pictor_core::{GeneratedVariant, OutputFormat, PipelineResult, PipelineStatus};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::queue::QueueError;

/// Where a generated variant ended up, returned to the caller for its own
/// metadata persistence.
#[derive(Debug, Clone, Serialize)]
pub struct StoredVariant {
    pub name: String,
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: usize,
    pub format: OutputFormat,
}

impl StoredVariant {
    pub fn new(variant: &GeneratedVariant, key: String, url: String) -> Self {
        Self {
            name: variant.spec_name.clone(),
            key,
            url,
            content_type: variant.content_type().to_string(),
            width: variant.width,
            height: variant.height,
            byte_size: variant.byte_size,
            format: variant.format,
        }
    }
}

/// Final outcome of a queued upload after retries.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub upload_id: Uuid,
    pub result: PipelineResult,
    /// Empty unless `result` is a success
    pub stored: Vec<StoredVariant>,
    pub attempts: u32,
}

impl JobOutcome {
    pub fn status(&self) -> PipelineStatus {
        self.result.status()
    }

    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

/// Handle to a submitted upload.
pub struct JobHandle {
    upload_id: Uuid,
    cancel: CancellationToken,
    reply: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub(crate) fn new(
        upload_id: Uuid,
        cancel: CancellationToken,
        reply: oneshot::Receiver<JobOutcome>,
    ) -> Self {
        Self {
            upload_id,
            cancel,
            reply,
        }
    }

    pub fn upload_id(&self) -> Uuid {
        self.upload_id
    }

    /// Cancel the upload. A running attempt stops at its next await point and
    /// no retry follows.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the final outcome.
    pub async fn wait(self) -> Result<JobOutcome, QueueError> {
        self.reply.await.map_err(|_| QueueError::Dropped(self.upload_id))
    }
}
