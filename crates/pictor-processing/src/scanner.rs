//! Malware scanning port and the pipeline stage that applies policy to it.
//!
//! Adapters (e.g. ClamAV) only report what the scanner said. Whether an
//! unavailable scanner blocks the upload is decided here, by the
//! [`FailurePolicy`] configured for the call site.

use async_trait::async_trait;
use bytes::Bytes;
use pictor_core::{FailurePolicy, PipelineConfig, PipelineError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    /// Signature name reported by the scanner
    Infected(String),
    /// The scanner could not give an answer (timeout, connection or protocol error)
    Unavailable(String),
}

#[async_trait]
pub trait MalwareScanner: Send + Sync {
    /// Scan the full buffer
    async fn scan(&self, data: Bytes) -> ScanVerdict;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

pub struct MalwareScanStage {
    scanner: Arc<dyn MalwareScanner>,
    timeout: Duration,
    policy: FailurePolicy,
}

impl MalwareScanStage {
    pub fn new(scanner: Arc<dyn MalwareScanner>, timeout: Duration, policy: FailurePolicy) -> Self {
        Self {
            scanner,
            timeout,
            policy,
        }
    }

    pub fn from_config(scanner: Arc<dyn MalwareScanner>, config: &PipelineConfig) -> Self {
        Self::new(scanner, config.clamav_timeout(), config.malware_scan_policy)
    }

    /// Block until the scanner answers, the timeout elapses or the run is cancelled.
    pub async fn check(
        &self,
        upload_id: Uuid,
        uploader: &str,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let start = Instant::now();
        let verdict = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.scanner.scan(data)) => match result {
                Ok(verdict) => verdict,
                Err(_) => ScanVerdict::Unavailable(format!(
                    "{} scan timeout (exceeded {} ms)",
                    self.scanner.name(),
                    self.timeout.as_millis()
                )),
            },
        };

        match verdict {
            ScanVerdict::Clean => {
                tracing::debug!(
                    upload_id = %upload_id,
                    scanner = self.scanner.name(),
                    duration_ms = start.elapsed().as_millis(),
                    "Malware scan clean"
                );
                Ok(())
            }
            ScanVerdict::Infected(signature) => {
                tracing::warn!(
                    target: "pictor::audit",
                    upload_id = %upload_id,
                    uploader = %uploader,
                    scanner = self.scanner.name(),
                    signature = %signature,
                    "Malware detected, upload rejected"
                );
                Err(PipelineError::RejectedMalware { signature })
            }
            ScanVerdict::Unavailable(reason) => match self.policy {
                FailurePolicy::FailClosed => {
                    tracing::error!(
                        upload_id = %upload_id,
                        scanner = self.scanner.name(),
                        reason = %reason,
                        "Malware scanner unavailable, failing closed"
                    );
                    Err(PipelineError::ScannerUnavailable(reason))
                }
                FailurePolicy::FailOpen => {
                    tracing::warn!(
                        target: "pictor::audit",
                        upload_id = %upload_id,
                        uploader = %uploader,
                        scanner = self.scanner.name(),
                        reason = %reason,
                        "Malware scanner unavailable, continuing without scan (fail-open)"
                    );
                    Ok(())
                }
            },
        }
    }
}
