//! Port and runtime dependency bundles for the sync scheduler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::BackendSlot;
use crate::domain::BlobUploader;
use crate::domain::ports::{ImageStore, RecognitionEngine};

use super::{SchedulerObserver, SyncSleeper};

/// Port bundle required by the scheduler.
pub struct SyncSchedulerPorts {
    /// Configured backend holder.
    pub backend: Arc<BackendSlot>,
    /// Recognition engine receiving terminal answers and acknowledgements.
    pub engine: Arc<dyn RecognitionEngine>,
    /// Image uploader whose target follows accepted listings.
    pub uploader: Arc<BlobUploader>,
    /// Snapshot image storage.
    pub images: Arc<dyn ImageStore>,
}

impl SyncSchedulerPorts {
    /// Build a strongly-typed scheduler port bundle.
    pub fn new(
        backend: Arc<BackendSlot>,
        engine: Arc<dyn RecognitionEngine>,
        uploader: Arc<BlobUploader>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            backend,
            engine,
            uploader,
            images,
        }
    }
}

/// Runtime helpers used by the poll loop.
pub struct SyncSchedulerRuntime {
    /// Async sleep implementation.
    pub sleeper: Arc<dyn SyncSleeper>,
    /// Optional outcome observer.
    pub observer: Option<Arc<dyn SchedulerObserver>>,
}

impl Default for SyncSchedulerRuntime {
    fn default() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            observer: None,
        }
    }
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl SyncSleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
