//! Capability interface of the recognition engine and the callbacks it
//! raises back into the sync core.
//!
//! The engine owns the POI cache. The core never mutates it directly; it
//! only answers cache requests and forwards put acknowledgements through
//! [`RecognitionEngine::poi_cache_request_callback`] and
//! [`RecognitionEngine::poi_cache_update_callback`].

use std::sync::Weak;

use super::define_port_error;
use super::poi_backend::PutResponse;
use crate::domain::{LocationFix, Poi, RecognitionState, RequestId, Snapshot, SnapshotId};

define_port_error! {
    /// Errors raised by engine operations addressed at a snapshot.
    pub enum RecognitionEngineError {
        /// No snapshot with this id is held by the engine.
        NotFound { snapshot_id: i64 } =>
            "snapshot {snapshot_id} is not held by the engine",
        /// The engine refused the operation.
        Rejected { message: String } =>
            "engine rejected operation: {message}",
    }
}

/// Structured diagnostic raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineDiagnostic {
    /// Informational key/value pair for a persistent debug label.
    Info {
        /// Label name.
        key: String,
        /// Label value.
        value: String,
    },
    /// User-facing error message.
    Error {
        /// Message text.
        message: String,
    },
}

/// Operations the core invokes on the recognition engine.
#[cfg_attr(test, mockall::automock)]
pub trait RecognitionEngine: Send + Sync {
    /// Hand a location fix to the engine.
    fn push_location(&self, fix: LocationFix);

    /// Ask the engine to capture the next frame; false when it declined.
    fn take_snapshot(&self) -> bool;

    /// Re-emit the snapshot with `id` through `on_snapshot`.
    ///
    /// Returns false without side effects when `id` is not the last
    /// recognised snapshot.
    fn get_snapshot(&self, id: SnapshotId) -> bool;

    /// Candidate POIs for tagging or search.
    fn get_poi_shortlist(&self, for_search: bool) -> Vec<Poi>;

    /// Associate `poi` with `snapshot`.
    fn tag_snapshot(&self, snapshot: &Snapshot, poi: &Poi) -> Result<(), RecognitionEngineError>;

    /// Confirm the recognition held for `id`.
    fn confirm_recognition(&self, id: SnapshotId) -> Result<(), RecognitionEngineError>;

    /// Reject the recognition held for `id`.
    fn reject_recognition(&self, id: SnapshotId) -> Result<(), RecognitionEngineError>;

    /// Request a fresh cache request for the current location.
    fn force_cache_refresh(&self);

    /// Last location the engine accepted.
    fn current_location(&self) -> Option<LocationFix>;

    /// Resume frame processing.
    fn restart_live_feed(&self);

    /// Pause frame processing.
    fn stop_live_feed(&self);

    /// Terminal answer for a cache request; `None` reports failure.
    ///
    /// Returns whether the engine accepted the listing.
    fn poi_cache_request_callback(
        &self,
        request_id: RequestId,
        fix: LocationFix,
        pois: Option<Vec<Poi>>,
    ) -> bool;

    /// Apply a put acknowledgement to the engine's POI cache.
    fn poi_cache_update_callback(&self, response: &PutResponse);

    /// Register the core as the engine's event sink.
    fn bind_events(&self, events: Weak<dyn EngineEvents>);
}

/// Callbacks the engine raises on the core.
///
/// Implementations must return quickly: every callback either enqueues work
/// or publishes to the event bus.
pub trait EngineEvents: Send + Sync {
    /// A snapshot has a recognition worth reporting to the backend.
    fn on_recognition(&self, snapshot: Snapshot);

    /// The engine wants POIs for the area around `fix`.
    fn on_cache_request(&self, request_id: RequestId, fix: LocationFix);

    /// Encoded image bytes for a freshly captured snapshot.
    fn on_snapshot_image_ready(&self, file_name: &str, image: Vec<u8>);

    /// Engine-internal failure.
    fn on_error(&self, tag: &str, message: &str, error: &str);

    /// Diagnostic for the debug overlay.
    fn on_diagnostic(&self, diagnostic: EngineDiagnostic);

    /// Recognition state transition.
    fn on_state_changed(&self, state: RecognitionState, poi: Option<Poi>, snapshot_id: SnapshotId);

    /// A snapshot is ready for display.
    fn on_snapshot(&self, snapshot: Snapshot);
}
