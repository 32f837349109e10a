//! Concurrency governor
//!
//! Owns the bounded pool of processing slots and the image engine. Every decode or
//! encode runs through [`ConcurrencyGovernor::run_blocking`], which acquires a slot,
//! moves it into the blocking task together with the engine, and releases it when
//! that task finishes. A caller that stops waiting (timeout, cancellation) does not
//! release the slot early: the slot stays held for as long as the engine is in use.

use pictor_core::{PipelineConfig, PipelineError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::compression::{ImageEncoder, VariantEncoder};
use crate::engine::ImageEngine;

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Maximum concurrent decode/encode units, system-wide
    pub slots: usize,
    /// How long a unit may wait for a slot before giving up
    pub acquire_timeout: Duration,
    /// Byte ceiling for decoded sources held by the engine
    pub cache_max_bytes: usize,
    /// Interval of the background cache sweep; zero disables it
    pub sweep_interval: Duration,
    pub max_dimension: u32,
    pub max_pixels: u64,
}

impl GovernorConfig {
    pub fn from_pipeline_config(config: &PipelineConfig) -> Self {
        Self {
            slots: config.worker_slots,
            acquire_timeout: config.slot_acquire_timeout(),
            cache_max_bytes: config.engine_cache_max_bytes,
            sweep_interval: config.cache_sweep_interval(),
            max_dimension: config.max_dimension,
            max_pixels: config.max_pixels,
        }
    }
}

/// A held processing slot. Dropping it (or passing it to
/// [`ConcurrencyGovernor::release_slot`]) returns the slot to the pool.
#[derive(Debug)]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ConcurrencyGovernor {
    slots: Arc<Semaphore>,
    total_slots: usize,
    acquire_timeout: Duration,
    engine: Arc<ImageEngine>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ConcurrencyGovernor {
    /// Build a governor without a background sweep.
    pub fn new(config: GovernorConfig) -> Self {
        Self::with_encoder(config, Arc::new(ImageEncoder))
    }

    /// Like [`new`](Self::new), with renditions encoded by `encoder`.
    pub fn with_encoder(config: GovernorConfig, encoder: Arc<dyn VariantEncoder>) -> Self {
        let slots = config.slots.max(1);
        Self {
            slots: Arc::new(Semaphore::new(slots)),
            total_slots: slots,
            acquire_timeout: config.acquire_timeout,
            engine: Arc::new(ImageEngine::new(
                config.max_dimension,
                config.max_pixels,
                config.cache_max_bytes,
                encoder,
            )),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// Build a governor and start its background cache sweep.
    /// Must be called within a Tokio runtime.
    pub fn start(config: GovernorConfig) -> Arc<Self> {
        let sweep_interval = config.sweep_interval;
        let governor = Arc::new(Self::new(config));
        if !sweep_interval.is_zero() {
            let handle = spawn_sweeper(
                governor.engine.clone(),
                sweep_interval,
                governor.shutdown.clone(),
            );
            *governor.sweeper.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }
        tracing::info!(
            slots = governor.total_slots,
            acquire_timeout_ms = governor.acquire_timeout.as_millis() as u64,
            sweep_interval_secs = sweep_interval.as_secs(),
            "Concurrency governor started"
        );
        governor
    }

    /// Wait for a free slot, at most the configured acquire timeout.
    pub async fn acquire_slot(&self, cancel: &CancellationToken) -> Result<SlotPermit, PipelineError> {
        if self.shutdown.is_cancelled() {
            return Err(PipelineError::ShuttingDown);
        }

        let start = Instant::now();
        let acquire = self.slots.clone().acquire_owned();
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = tokio::time::timeout(self.acquire_timeout, acquire) => match result {
                Ok(Ok(permit)) => permit,
                Ok(Err(_closed)) => return Err(PipelineError::ShuttingDown),
                Err(_) => {
                    let waited_ms = start.elapsed().as_millis() as u64;
                    tracing::warn!(
                        waited_ms,
                        slots = self.total_slots,
                        "No processing slot available"
                    );
                    return Err(PipelineError::GovernorExhausted { waited_ms });
                }
            },
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(SlotPermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Return a slot taken with [`acquire_slot`](Self::acquire_slot).
    pub fn release_slot(&self, permit: SlotPermit) {
        drop(permit);
        tracing::trace!(in_flight = self.in_flight(), "Processing slot released");
    }

    /// Run one unit of engine work on a slot.
    ///
    /// `stage` names the unit in timeout errors. The slot is released when `work`
    /// returns, even if this future has already resolved with `Timeout` or
    /// `Cancelled`; the late result is discarded.
    pub async fn run_blocking<T, F>(
        &self,
        stage: &'static str,
        timeout: Duration,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce(&ImageEngine) -> Result<T, PipelineError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.acquire_slot(cancel).await?;
        let engine = self.engine.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _slot = permit;
            work(&engine)
        });

        tokio::select! {
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            result = tokio::time::timeout(timeout, handle) => match result {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => Err(PipelineError::Internal(format!("{} worker failed: {}", stage, e))),
                Err(_) => Err(PipelineError::Timeout {
                    stage,
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
        }
    }

    /// Drop the cached decoded source for an upload.
    pub fn release_source(&self, upload_id: Uuid) {
        if self.engine.evict(&upload_id) {
            tracing::debug!(upload_id = %upload_id, "Released cached source image");
        }
    }

    /// Engine counters (decodes, encodes, cache footprint)
    pub fn engine(&self) -> &ImageEngine {
        &self.engine
    }

    pub fn total_slots(&self) -> usize {
        self.total_slots
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously held slots since start
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop the sweep, refuse new slots and release the engine cache.
    /// Units already holding a slot run to completion.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.slots.close();

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Cache sweeper task failed");
            }
        }

        let freed = self.engine.sweep();
        tracing::info!(
            freed_bytes = freed,
            in_flight = self.in_flight(),
            peak_in_flight = self.peak_in_flight(),
            decodes = self.engine.decode_count(),
            encodes = self.engine.encode_count(),
            "Concurrency governor shut down"
        );
    }
}

fn spawn_sweeper(
    engine: Arc<ImageEngine>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let freed = engine.sweep();
                    if freed > 0 {
                        tracing::debug!(freed_bytes = freed, "Swept image engine cache");
                    }
                }
            }
        }
    })
}
