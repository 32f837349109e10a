//! Upload job queue: bounded submission, a worker pool sharing one pipeline,
//! retry of recoverable failures, and all-or-nothing variant persistence.

pub mod job;
pub mod persist;
pub mod queue;

pub use job::{JobHandle, JobOutcome, StoredVariant};
pub use persist::persist_variants;
pub use queue::{
    compute_retry_backoff_seconds, QueueError, UploadJobQueue, UploadQueueConfig,
    MAX_RETRY_BACKOFF_SECS,
};
