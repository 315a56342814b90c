//! Image upload followed by the recognition event put.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::Snapshot;
use crate::domain::ports::PoiBackend;

use super::mapping::put_request;
use super::{EventUploadOutcome, SchedulerShared};

pub(super) struct EventUploadTask {
    snapshot: Snapshot,
}

impl EventUploadTask {
    pub(super) fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub(super) async fn run(
        self,
        shared: &SchedulerShared,
        backend: Arc<dyn PoiBackend>,
    ) -> EventUploadOutcome {
        let snapshot_id = self.snapshot.id;
        let file_name = self.snapshot.image_file_name.as_str();
        let image_uploaded = self.upload_image(shared).await;

        let request = put_request(&self.snapshot, &shared.config.device_id);
        let response = match backend.put(&request).await {
            Ok(response) => response,
            Err(err) => {
                // Dropped without a durable outbox; the id stays eligible
                // for a later resubmission.
                warn!(snapshot_id = %snapshot_id, error = %err, "PUT /pois failed, event dropped");
                return EventUploadOutcome::Dropped {
                    snapshot_id,
                    image_uploaded,
                    reason: err.to_string(),
                };
            }
        };

        info!(
            snapshot_id = %snapshot_id,
            created = response.created.len(),
            "recognition event acknowledged"
        );
        shared.engine.poi_cache_update_callback(&response);
        match shared.images.remove(file_name) {
            Ok(true) => debug!(snapshot_id = %snapshot_id, file_name, "snapshot image removed"),
            Ok(false) => debug!(snapshot_id = %snapshot_id, file_name, "snapshot image already gone or leased"),
            Err(err) => warn!(snapshot_id = %snapshot_id, error = %err, "snapshot image removal failed"),
        }
        EventUploadOutcome::Acknowledged {
            snapshot_id,
            image_uploaded,
            created: response.created.len(),
        }
    }

    async fn upload_image(&self, shared: &SchedulerShared) -> bool {
        let snapshot_id = self.snapshot.id;
        let lease = match shared.images.lease(&self.snapshot.image_file_name) {
            Ok(lease) => lease,
            Err(err) => {
                warn!(snapshot_id = %snapshot_id, error = %err, "snapshot image unavailable");
                return false;
            }
        };
        match shared.uploader.upload_image(&lease).await {
            Ok(receipt) => {
                debug!(snapshot_id = %snapshot_id, key = %receipt.key, "snapshot image uploaded");
                true
            }
            Err(err) => {
                warn!(snapshot_id = %snapshot_id, error = %err, "snapshot image upload failed");
                false
            }
        }
    }
}
