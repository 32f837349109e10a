use pictor_core::GeneratedVariant;
use pictor_storage::{Storage, StorageError};
use uuid::Uuid;

use crate::job::StoredVariant;

/// Write every variant to storage. If any write fails, the keys already
/// written for this upload are deleted before the error is returned.
pub async fn persist_variants(
    storage: &dyn Storage,
    upload_id: Uuid,
    variants: &[GeneratedVariant],
) -> Result<Vec<StoredVariant>, StorageError> {
    let mut stored: Vec<StoredVariant> = Vec::with_capacity(variants.len());

    for variant in variants {
        let key = variant.suggested_key(upload_id);
        match storage
            .put(&key, variant.encoded_bytes.clone(), variant.content_type())
            .await
        {
            Ok(url) => stored.push(StoredVariant::new(variant, key, url)),
            Err(e) => {
                tracing::error!(
                    upload_id = %upload_id,
                    storage_key = %key,
                    backend = storage.backend_name(),
                    error = %e,
                    written = stored.len(),
                    "Variant write failed, removing variants already written"
                );
                rollback(storage, upload_id, &stored).await;
                return Err(e);
            }
        }
    }

    Ok(stored)
}

async fn rollback(storage: &dyn Storage, upload_id: Uuid, stored: &[StoredVariant]) {
    for variant in stored {
        if let Err(e) = storage.delete(&variant.key).await {
            tracing::error!(
                upload_id = %upload_id,
                storage_key = %variant.key,
                error = %e,
                "Failed to remove orphaned variant"
            );
        }
    }
}
