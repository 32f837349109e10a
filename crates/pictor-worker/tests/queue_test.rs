mod helpers;

use helpers::*;
use pictor_core::{OutputFormat, PipelineStatus, UploadRequest};
use pictor_worker::QueueError;
use std::sync::Arc;

#[tokio::test]
async fn test_success_stores_every_variant() {
    let storage = Arc::new(MemoryStorage::new());
    let (queue, _governor) = build_queue(
        Arc::new(FlakyScanner::new(0)),
        storage.clone(),
        queue_config(3),
    );

    let request = UploadRequest::new(png_bytes(64, 48), "photo.png", "image/png", "user-1");
    let id = request.id;
    let outcome = queue.submit(request).unwrap().wait().await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.upload_id, id);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.stored.len(), 2);

    let thumb = outcome.stored.iter().find(|v| v.name == "thumbnail").unwrap();
    assert_eq!(thumb.key, format!("images/{}/thumbnail.png", id));
    assert_eq!(thumb.url, format!("memory://images/{}/thumbnail.png", id));
    assert_eq!((thumb.width, thumb.height), (32, 24));
    assert_eq!(thumb.content_type, "image/png");

    let small = outcome.stored.iter().find(|v| v.name == "small").unwrap();
    assert_eq!(small.format, OutputFormat::Jpeg);
    assert_eq!((small.width, small.height), (64, 48));

    assert_eq!(
        storage.keys(),
        vec![
            format!("images/{}/small.jpg", id),
            format!("images/{}/thumbnail.png", id)
        ]
    );
}

#[tokio::test]
async fn test_recoverable_failure_is_retried() {
    let scanner = Arc::new(FlakyScanner::new(2));
    let storage = Arc::new(MemoryStorage::new());
    let (queue, _governor) = build_queue(scanner.clone(), storage.clone(), queue_config(3));

    let request = UploadRequest::new(png_bytes(40, 40), "a.png", "image/png", "user-1");
    let outcome = queue.submit(request).unwrap().wait().await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts, 3);
    assert_eq!(scanner.calls(), 3);
    assert_eq!(storage.len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_fail_without_variants() {
    let scanner = Arc::new(FlakyScanner::new(usize::MAX));
    let storage = Arc::new(MemoryStorage::new());
    let (queue, _governor) = build_queue(scanner.clone(), storage.clone(), queue_config(2));

    let request = UploadRequest::new(png_bytes(40, 40), "a.png", "image/png", "user-1");
    let outcome = queue.submit(request).unwrap().wait().await.unwrap();

    assert_eq!(outcome.status(), PipelineStatus::Failed);
    assert_eq!(outcome.result.error_code(), Some("SCANNER_UNAVAILABLE"));
    assert_eq!(outcome.attempts, 3);
    assert_eq!(scanner.calls(), 3);
    assert!(outcome.stored.is_empty());
    assert_eq!(storage.len(), 0);
}

#[tokio::test]
async fn test_rejection_is_not_retried() {
    let scanner = Arc::new(FlakyScanner::new(0));
    let storage = Arc::new(MemoryStorage::new());
    let (queue, _governor) = build_queue(scanner.clone(), storage.clone(), queue_config(3));

    let request = UploadRequest::new(&b"just some notes"[..], "notes.png", "image/png", "user-1");
    let outcome = queue.submit(request).unwrap().wait().await.unwrap();

    assert_eq!(outcome.status(), PipelineStatus::Rejected);
    assert_eq!(outcome.result.error_code(), Some("UNSUPPORTED_FORMAT"));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(scanner.calls(), 0);
    assert_eq!(storage.puts(), 0);
}

#[tokio::test]
async fn test_storage_failure_removes_written_variants() {
    let storage = Arc::new(MemoryStorage::failing_on(2));
    let (queue, _governor) = build_queue(
        Arc::new(FlakyScanner::new(0)),
        storage.clone(),
        queue_config(0),
    );

    let request = UploadRequest::new(png_bytes(64, 48), "a.png", "image/png", "user-1");
    let outcome = queue.submit(request).unwrap().wait().await.unwrap();

    assert_eq!(outcome.status(), PipelineStatus::Failed);
    assert_eq!(outcome.result.error_code(), Some("INTERNAL_ERROR"));
    assert!(outcome.result.variants().is_empty());
    assert!(outcome.stored.is_empty());
    assert_eq!(storage.puts(), 2);
    assert_eq!(storage.deletes(), 1);
    assert_eq!(storage.len(), 0);
}

#[tokio::test]
async fn test_submit_fails_fast_when_full() {
    let storage = Arc::new(MemoryStorage::new());
    let mut config = queue_config(0);
    config.queue_size = 1;
    config.max_concurrent = 1;
    let (queue, _governor) = build_queue(Arc::new(HangingScanner), storage, config);

    let mut handles = Vec::new();
    let mut rejected = None;
    for i in 0..10 {
        let request = UploadRequest::new(png_bytes(8, 8), format!("{}.png", i), "image/png", "u");
        match queue.submit(request) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                rejected = Some(e);
                break;
            }
        }
        tokio::task::yield_now().await;
    }

    assert!(matches!(rejected, Some(QueueError::Full)));
    assert!(handles.len() <= 3);
    queue.shutdown();
}

#[tokio::test]
async fn test_cancel_stops_job_without_retry() {
    let storage = Arc::new(MemoryStorage::new());
    let (queue, _governor) = build_queue(Arc::new(HangingScanner), storage.clone(), queue_config(3));

    let request = UploadRequest::new(png_bytes(16, 16), "a.png", "image/png", "user-1");
    let handle = queue.submit(request).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.cancel();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.status(), PipelineStatus::Failed);
    assert_eq!(outcome.result.error_code(), Some("CANCELLED"));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(storage.len(), 0);
}

#[tokio::test]
async fn test_submit_after_shutdown_is_refused() {
    let (queue, _governor) = build_queue(
        Arc::new(FlakyScanner::new(0)),
        Arc::new(MemoryStorage::new()),
        queue_config(0),
    );
    queue.shutdown();
    assert!(queue.is_shut_down());

    let request = UploadRequest::new(png_bytes(8, 8), "a.png", "image/png", "user-1");
    assert!(matches!(queue.submit(request), Err(QueueError::ShuttingDown)));
}

#[tokio::test]
async fn test_outcome_serializes_for_callers() {
    let (queue, _governor) = build_queue(
        Arc::new(FlakyScanner::new(0)),
        Arc::new(MemoryStorage::new()),
        queue_config(0),
    );

    let request = UploadRequest::new(png_bytes(20, 10), "a.png", "image/png", "user-1");
    let outcome = queue.submit(request).unwrap().wait().await.unwrap();
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["result"]["status"], "success");
    assert_eq!(json["attempts"], 1);
    assert_eq!(json["stored"].as_array().unwrap().len(), 2);
    assert!(json["result"]["variants"][0].get("encoded_bytes").is_none());
}
