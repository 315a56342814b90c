//! Pushes stored snapshot images to the backend-provided bucket.

use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use super::ports::{BlobSink, BlobSinkError, ImageLease, UploadTarget};

/// Errors raised by [`BlobUploader::upload_image`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobUploadError {
    /// No cache refresh has configured a bucket yet.
    #[error("no upload target configured")]
    NoTarget,
    /// The object store refused or could not be reached.
    #[error(transparent)]
    Sink(#[from] BlobSinkError),
}

/// Where an image ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Target the upload started with.
    pub target: UploadTarget,
    /// Object key written.
    pub key: String,
}

/// Uploads leased images to the current target.
///
/// The target is read once when an upload starts; a concurrent
/// [`BlobUploader::set_bucket`] only affects later uploads.
pub struct BlobUploader {
    sink: Arc<dyn BlobSink>,
    target: RwLock<Option<UploadTarget>>,
}

impl BlobUploader {
    /// Build an uploader without a target.
    pub fn new(sink: Arc<dyn BlobSink>) -> Self {
        Self {
            sink,
            target: RwLock::new(None),
        }
    }

    /// Replace the upload target.
    pub fn set_bucket(&self, bucket: impl Into<String>, folder: impl Into<String>) {
        let target = UploadTarget::new(bucket, folder);
        info!(bucket = %target.bucket, folder = %target.folder, "upload target set");
        match self.target.write() {
            Ok(mut guard) => *guard = Some(target),
            Err(poisoned) => *poisoned.into_inner() = Some(target),
        }
    }

    /// Current target, if any.
    pub fn target(&self) -> Option<UploadTarget> {
        match self.target.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Upload the leased image.
    ///
    /// # Errors
    ///
    /// [`BlobUploadError::NoTarget`] before any target is set, or the sink
    /// error when the put fails.
    pub async fn upload_image(&self, lease: &ImageLease) -> Result<UploadReceipt, BlobUploadError> {
        let target = self.target().ok_or(BlobUploadError::NoTarget)?;
        let key = target.object_key(lease.file_name());
        debug!(bucket = %target.bucket, key = %key, bytes = lease.read().len(), "uploading image");
        self.sink
            .put_object(&target, &key, lease.read().to_vec())
            .await?;
        Ok(UploadReceipt { target, key })
    }
}
