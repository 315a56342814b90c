//! Domain model and services of the sync core.
//!
//! Purpose: Define the values exchanged with the recognition engine and the
//! backend, and the services that move them: the sync scheduler, the
//! location bridge, the event bus, and the `Urbo` facade. The domain talks
//! to the outside world only through the traits in [`ports`].
//!
//! Public surface:
//! - Error (alias to `error::Error`): domain error with a stable code.
//! - Urbo (alias to `urbo::Urbo`): facade bound to one recognition engine.
//! - SyncScheduler (alias to `sync_scheduler::SyncScheduler`): backend work
//!   queue shared by cache refreshes and event uploads.

pub mod backend_slot;
pub mod blob_uploader;
pub mod cache_request;
pub mod device_id;
pub mod error;
pub mod event_bus;
pub mod location;
pub mod location_bridge;
pub mod poi;
pub mod poi_cache;
pub mod ports;
pub mod snapshot;
pub mod sync_scheduler;
pub mod urbo;

pub use self::backend_slot::{BackendConfig, BackendSlot, PoiBackendFactory, StaticBackendFactory};
pub use self::blob_uploader::{BlobUploadError, BlobUploader, UploadReceipt};
pub use self::cache_request::{CacheRequest, RequestId};
pub use self::device_id::device_id;
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::event_bus::{
    DebugListener, DiagnosticEvent, EventBus, Notification, RecognitionListener,
};
pub use self::location::{LocationFix, LocationFixValidationError};
pub use self::location_bridge::{BridgeState, LocationBridge, LocationBridgeConfig};
pub use self::poi::{Poi, PoiClientId, PoiVote};
pub use self::poi_cache::PoiCache;
pub use self::snapshot::{RecognitionEvent, RecognitionState, Snapshot, SnapshotId};
pub use self::sync_scheduler::{
    CacheRefreshOutcome, EventUploadOutcome, PoolClosed, RetryState, SchedulerObserver,
    Submission, SyncScheduler, SyncSchedulerConfig, SyncSchedulerPorts, SyncSchedulerRuntime,
    SyncSleeper, TokioSleeper, WorkerPool,
};
pub use self::urbo::{Urbo, UrboOptions, UrboPorts, UrboRuntime};
