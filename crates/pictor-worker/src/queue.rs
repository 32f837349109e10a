//! Upload job queue: bounded channel, worker pool, retry and dead-lettering.
//!
//! Shutdown: [`UploadJobQueue::shutdown`] stops the pool from taking new jobs and
//! cancels every running attempt. Jobs still waiting in the channel are dropped and
//! their handles resolve to [`QueueError::Dropped`].

use pictor_core::{PipelineConfig, PipelineError, PipelineResult, PipelineStatus, UploadRequest};
use pictor_processing::ImagePipeline;
use pictor_storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::job::{JobHandle, JobOutcome, StoredVariant};
use crate::persist::persist_variants;

/// Maximum delay in seconds before retrying a failed upload. Caps exponential
/// backoff so that high retry counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given retry count (exponential with cap).
#[inline]
pub fn compute_retry_backoff_seconds(retry_count: u32) -> u64 {
    2_u64
        .checked_pow(retry_count)
        .unwrap_or(u64::MAX)
        .min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Upload queue is full, please try again later")]
    Full,

    #[error("Upload queue is closed")]
    Closed,

    #[error("Upload queue is shutting down")]
    ShuttingDown,

    #[error("Upload {0} was dropped before completion")]
    Dropped(Uuid),
}

#[derive(Debug, Clone)]
pub struct UploadQueueConfig {
    pub queue_size: usize,
    pub max_concurrent: usize,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff for retry `n` is `2^n` of these units, capped at
    /// [`MAX_RETRY_BACKOFF_SECS`] units
    pub retry_backoff_unit: Duration,
}

impl UploadQueueConfig {
    pub fn from_pipeline_config(config: &PipelineConfig) -> Self {
        Self {
            queue_size: config.upload_queue_size.max(1),
            max_concurrent: config.upload_queue_max_concurrent.max(1),
            max_retries: config.upload_queue_max_retries,
            retry_backoff_unit: Duration::from_secs(1),
        }
    }
}

struct UploadJob {
    request: UploadRequest,
    cancel: CancellationToken,
    reply: oneshot::Sender<JobOutcome>,
}

struct WorkerContext {
    pipeline: Arc<ImagePipeline>,
    storage: Arc<dyn Storage>,
    config: UploadQueueConfig,
}

pub struct UploadJobQueue {
    tx: mpsc::Sender<UploadJob>,
    shutdown: CancellationToken,
}

impl UploadJobQueue {
    /// Create the queue and spawn its worker pool.
    ///
    /// If the channel is full, `submit()` returns [`QueueError::Full`].
    pub fn new(
        pipeline: Arc<ImagePipeline>,
        storage: Arc<dyn Storage>,
        config: UploadQueueConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let shutdown = CancellationToken::new();

        tracing::info!(
            queue_size = config.queue_size,
            max_concurrent = config.max_concurrent,
            max_retries = config.max_retries,
            storage = storage.backend_name(),
            "Upload job queue initialized with bounded channel"
        );

        let ctx = Arc::new(WorkerContext {
            pipeline,
            storage,
            config,
        });
        let pool_shutdown = shutdown.clone();
        tokio::spawn(async move {
            Self::worker_pool(rx, ctx, pool_shutdown).await;
        });

        Self { tx, shutdown }
    }

    /// Enqueue an upload without waiting. Fails fast when the queue is full.
    #[tracing::instrument(skip_all, fields(upload_id = %request.id))]
    pub fn submit(&self, request: UploadRequest) -> Result<JobHandle, QueueError> {
        let (job, handle) = self.prepare(request)?;
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!("Upload job queue is full, rejecting job");
                QueueError::Full
            }
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        tracing::debug!("Upload enqueued");
        Ok(handle)
    }

    /// Enqueue an upload, waiting for room if the queue is full.
    #[tracing::instrument(skip_all, fields(upload_id = %request.id))]
    pub async fn submit_async(&self, request: UploadRequest) -> Result<JobHandle, QueueError> {
        let (job, handle) = self.prepare(request)?;
        tokio::select! {
            _ = self.shutdown.cancelled() => return Err(QueueError::ShuttingDown),
            sent = self.tx.send(job) => sent.map_err(|_| QueueError::Closed)?,
        }
        tracing::debug!("Upload enqueued");
        Ok(handle)
    }

    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Upload job queue shutting down");
        }
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn prepare(&self, request: UploadRequest) -> Result<(UploadJob, JobHandle), QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::ShuttingDown);
        }
        let (reply, rx) = oneshot::channel();
        let cancel = self.shutdown.child_token();
        let handle = JobHandle::new(request.id, cancel.clone(), rx);
        Ok((
            UploadJob {
                request,
                cancel,
                reply,
            },
            handle,
        ))
    }

    async fn worker_pool(
        mut rx: mpsc::Receiver<UploadJob>,
        ctx: Arc<WorkerContext>,
        shutdown: CancellationToken,
    ) {
        let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent.max(1)));

        loop {
            let job = tokio::select! {
                _ = shutdown.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let ctx = ctx.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let UploadJob {
                    request,
                    cancel,
                    reply,
                } = job;
                let outcome = Self::process_job(request, &cancel, &ctx).await;
                if reply.send(outcome).is_err() {
                    tracing::debug!("Upload caller went away before the outcome was ready");
                }
            });
        }

        tracing::info!("Upload worker pool stopped");
    }

    #[tracing::instrument(
        skip_all,
        fields(upload_id = %request.id, job.status = tracing::field::Empty)
    )]
    async fn process_job(
        request: UploadRequest,
        cancel: &CancellationToken,
        ctx: &WorkerContext,
    ) -> JobOutcome {
        let upload_id = request.id;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let (result, stored) = Self::attempt(&request, cancel, ctx).await;

            let finished = result.is_success() || !result.is_retryable() || cancel.is_cancelled();
            if finished || attempts > ctx.config.max_retries {
                if !finished {
                    tracing::error!(
                        target: "pictor::audit",
                        upload_id = %upload_id,
                        attempts,
                        code = result.error_code().unwrap_or("UNKNOWN"),
                        "Upload moved to dead letter after exhausting retries"
                    );
                }
                tracing::Span::current().record("job.status", status_label(&result));
                return JobOutcome {
                    upload_id,
                    result,
                    stored,
                    attempts,
                };
            }

            let backoff = compute_retry_backoff_seconds(attempts);
            let delay = ctx
                .config
                .retry_backoff_unit
                .saturating_mul(u32::try_from(backoff).unwrap_or(u32::MAX));
            tracing::warn!(
                upload_id = %upload_id,
                attempt = attempts,
                code = result.error_code().unwrap_or("UNKNOWN"),
                delay_ms = delay.as_millis() as u64,
                "Upload attempt failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    let result = PipelineResult::from_error(upload_id, &PipelineError::Cancelled);
                    tracing::Span::current().record("job.status", status_label(&result));
                    return JobOutcome {
                        upload_id,
                        result,
                        stored: Vec::new(),
                        attempts,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One pipeline run plus persistence. Storage failures surface as a
    /// recoverable failure with nothing left behind.
    async fn attempt(
        request: &UploadRequest,
        cancel: &CancellationToken,
        ctx: &WorkerContext,
    ) -> (PipelineResult, Vec<StoredVariant>) {
        let upload_id = request.id;
        let result = ctx.pipeline.process(request.clone(), cancel).await;
        if !result.is_success() {
            return (result, Vec::new());
        }

        match persist_variants(ctx.storage.as_ref(), upload_id, result.variants()).await {
            Ok(stored) => {
                tracing::info!(
                    upload_id = %upload_id,
                    stored = stored.len(),
                    "Upload variants stored"
                );
                (result, stored)
            }
            Err(e) => {
                let error = PipelineError::Internal(format!("variant storage failed: {}", e));
                (PipelineResult::from_error(upload_id, &error), Vec::new())
            }
        }
    }
}

fn status_label(result: &PipelineResult) -> &'static str {
    match result.status() {
        PipelineStatus::Success => "success",
        PipelineStatus::Rejected => "rejected",
        PipelineStatus::Failed => "failed",
    }
}

impl Clone for UploadJobQueue {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}
