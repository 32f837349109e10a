use bytes::Bytes;
use uuid::Uuid;

/// A single upload handed to the pipeline.
///
/// `claimed_filename` and `claimed_content_type` come straight from the client and
/// are untrusted; they are kept for logging only. `data` is reference counted so a
/// retrying caller can resubmit the same request without copying the payload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub id: Uuid,
    pub data: Bytes,
    pub claimed_filename: String,
    pub claimed_content_type: String,
    /// Opaque uploader identity, used for audit logging only
    pub uploader: String,
}

impl UploadRequest {
    pub fn new(
        data: impl Into<Bytes>,
        claimed_filename: impl Into<String>,
        claimed_content_type: impl Into<String>,
        uploader: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            data: data.into(),
            claimed_filename: claimed_filename.into(),
            claimed_content_type: claimed_content_type.into(),
            uploader: uploader.into(),
        }
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }
}
