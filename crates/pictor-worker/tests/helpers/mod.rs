#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use pictor_core::{FailurePolicy, PipelineConfig, VariantSpec};
use pictor_processing::{
    ConcurrencyGovernor, GovernorConfig, ImagePipeline, MalwareScanner, ScanVerdict,
};
use pictor_storage::{Storage, StorageError, StorageResult};
use pictor_worker::{UploadJobQueue, UploadQueueConfig};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 90])
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    Bytes::from(buf)
}

/// In-memory storage that can be told to fail the nth write.
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_on_put: Option<usize>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_on_put: None,
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Fail the `n`th put (1-based)
    pub fn failing_on(n: usize) -> Self {
        Self {
            fail_on_put: Some(n),
            ..Self::new()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<String> {
        let n = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_put == Some(n) {
            return Err(StorageError::UploadFailed(format!("injected failure for {}", key)));
        }
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(format!("memory://{}", key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Reports the scanner as unreachable for the first `failures` calls.
pub struct FlakyScanner {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyScanner {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MalwareScanner for FlakyScanner {
    async fn scan(&self, _data: Bytes) -> ScanVerdict {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            ScanVerdict::Unavailable("connection refused".to_string())
        } else {
            ScanVerdict::Clean
        }
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

pub struct HangingScanner;

#[async_trait]
impl MalwareScanner for HangingScanner {
    async fn scan(&self, _data: Bytes) -> ScanVerdict {
        std::future::pending::<ScanVerdict>().await
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        worker_slots: 4,
        variants: VariantSpec::parse_list("thumbnail:32:png:80,small:64:jpeg:80").unwrap(),
        decode_timeout_secs: 120,
        variant_timeout_secs: 120,
        clamav_timeout_secs: 60,
        malware_scan_policy: FailurePolicy::FailClosed,
        ..Default::default()
    }
}

pub fn queue_config(max_retries: u32) -> UploadQueueConfig {
    UploadQueueConfig {
        queue_size: 16,
        max_concurrent: 2,
        max_retries,
        retry_backoff_unit: Duration::from_millis(1),
    }
}

pub fn build_queue(
    scanner: Arc<dyn MalwareScanner>,
    storage: Arc<dyn Storage>,
    queue: UploadQueueConfig,
) -> (UploadJobQueue, Arc<ConcurrencyGovernor>) {
    let config = test_config();
    let governor = Arc::new(ConcurrencyGovernor::new(GovernorConfig::from_pipeline_config(
        &config,
    )));
    let pipeline = Arc::new(ImagePipeline::new(&config, governor.clone(), scanner));
    (UploadJobQueue::new(pipeline, storage, queue), governor)
}
