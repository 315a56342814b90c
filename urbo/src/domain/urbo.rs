//! Application-facing facade wiring the engine to sync, location, and UI.
//!
//! `Urbo` owns the backend slot, the blob uploader, the sync scheduler, the
//! location bridge, and the event bus. It binds itself to the recognition
//! engine as the engine's event sink through a weak reference, so dropping
//! the facade silences the engine's callbacks instead of leaking a cycle.

use std::sync::{Arc, Weak};

use mockable::{Clock, DefaultClock};
use tracing::{debug, error, info, warn};

use super::event_bus::{
    DebugListener, DiagnosticEvent, EventBus, Notification, RecognitionListener,
};
use super::ports::{
    BlobSink, EngineDiagnostic, EngineEvents, ImageStore, LocationSource, RecognitionEngine,
    RecognitionEngineError,
};
use super::{
    BackendSlot, BlobUploader, BridgeState, Error, ErrorCode, LocationBridge,
    LocationBridgeConfig, LocationFix, Poi, PoiBackendFactory, RecognitionState, RequestId,
    SchedulerObserver, Snapshot, SnapshotId, Submission, SyncScheduler, SyncSchedulerConfig,
    SyncSchedulerPorts, SyncSchedulerRuntime, SyncSleeper, TokioSleeper,
};

/// Driven adapters required by the facade.
pub struct UrboPorts {
    /// Builds the backend once endpoint and API key are known.
    pub backend_factory: Arc<dyn PoiBackendFactory>,
    /// Object storage for snapshot images.
    pub blob_sink: Arc<dyn BlobSink>,
    /// Local snapshot image storage.
    pub images: Arc<dyn ImageStore>,
    /// Platform location services.
    pub location: Arc<dyn LocationSource>,
}

/// Time and observation hooks; replaced in tests.
pub struct UrboRuntime {
    /// Clock for the poll ceiling.
    pub clock: Arc<dyn Clock>,
    /// Sleeper for poll delays and reconnects.
    pub sleeper: Arc<dyn SyncSleeper>,
    /// Optional scheduler outcome observer.
    pub observer: Option<Arc<dyn SchedulerObserver>>,
}

impl Default for UrboRuntime {
    fn default() -> Self {
        Self {
            clock: Arc::new(DefaultClock),
            sleeper: Arc::new(TokioSleeper),
            observer: None,
        }
    }
}

/// Facade settings resolved from configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrboOptions {
    /// Backend endpoint applied at construction.
    pub endpoint: Option<String>,
    /// API key applied at construction.
    pub api_key: Option<String>,
    /// Scheduler settings, including the device id.
    pub scheduler: SyncSchedulerConfig,
    /// Location bridge settings.
    pub location: LocationBridgeConfig,
}

/// The sync core.
pub struct Urbo {
    engine: Arc<dyn RecognitionEngine>,
    backend: Arc<BackendSlot>,
    images: Arc<dyn ImageStore>,
    scheduler: SyncScheduler,
    bridge: LocationBridge,
    bus: EventBus,
    device_id: String,
}

impl Urbo {
    /// Build the core and bind it to `engine`.
    ///
    /// Must be called inside a Tokio runtime: the scheduler workers and the
    /// event dispatcher are spawned here.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidRequest`] when the configured endpoint or
    /// API key is malformed.
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        ports: UrboPorts,
        options: UrboOptions,
    ) -> Result<Arc<Self>, Error> {
        Self::with_runtime(engine, ports, UrboRuntime::default(), options)
    }

    /// Build the core with injected runtime hooks.
    ///
    /// # Errors
    ///
    /// See [`Urbo::new`].
    pub fn with_runtime(
        engine: Arc<dyn RecognitionEngine>,
        ports: UrboPorts,
        runtime: UrboRuntime,
        options: UrboOptions,
    ) -> Result<Arc<Self>, Error> {
        let UrboOptions {
            endpoint,
            api_key,
            scheduler,
            location,
        } = options;
        let backend = Arc::new(BackendSlot::new(ports.backend_factory));
        let uploader = Arc::new(BlobUploader::new(ports.blob_sink));
        let device_id = scheduler.device_id.clone();
        let scheduler = SyncScheduler::with_runtime(
            SyncSchedulerPorts::new(
                Arc::clone(&backend),
                Arc::clone(&engine),
                uploader,
                Arc::clone(&ports.images),
            ),
            runtime.clock,
            SyncSchedulerRuntime {
                sleeper: Arc::clone(&runtime.sleeper),
                observer: runtime.observer,
            },
            scheduler,
        );
        let bridge = LocationBridge::new(
            ports.location,
            Arc::clone(&engine),
            runtime.sleeper,
            location,
        );
        let urbo = Arc::new(Self {
            engine,
            backend,
            images: ports.images,
            scheduler,
            bridge,
            bus: EventBus::new(),
            device_id,
        });
        let weak: Weak<Self> = Arc::downgrade(&urbo);
        let events: Weak<dyn EngineEvents> = weak;
        urbo.engine.bind_events(events);
        info!(device_id = %urbo.device_id, "urbo core bound to recognition engine");

        if let Some(endpoint) = endpoint {
            urbo.set_endpoint(&endpoint)?;
        }
        if let Some(api_key) = api_key {
            urbo.set_api_key(&api_key)?;
        }
        Ok(urbo)
    }

    /// Set the backend API key.
    ///
    /// Once both endpoint and key are present the engine is asked for a
    /// fresh cache request.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::InvalidRequest`] for a blank key.
    pub fn set_api_key(&self, api_key: &str) -> Result<(), Error> {
        let ready = self.backend.set_api_key(api_key)?;
        self.refresh_when_ready(ready);
        Ok(())
    }

    /// Set the backend endpoint.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::InvalidRequest`] for a malformed URL.
    pub fn set_endpoint(&self, endpoint: &str) -> Result<(), Error> {
        let ready = self.backend.set_endpoint(endpoint)?;
        self.refresh_when_ready(ready);
        Ok(())
    }

    fn refresh_when_ready(&self, ready: bool) {
        if ready {
            info!("backend configured, requesting cache refresh");
            self.engine.force_cache_refresh();
        }
    }

    /// Start location updates and the live feed.
    pub fn start(&self) {
        self.bridge.start();
        self.engine.restart_live_feed();
    }

    /// Stop location updates and the live feed.
    pub async fn stop(&self) {
        self.bridge.stop().await;
        self.engine.stop_live_feed();
    }

    /// Connect to location services without touching the live feed.
    pub fn connect_location_service(&self) {
        self.bridge.start();
    }

    /// Whether the GPS provider is enabled.
    pub fn is_location_provider_enabled(&self) -> bool {
        self.bridge.is_provider_enabled()
    }

    /// Current location bridge state.
    pub fn location_state(&self) -> BridgeState {
        self.bridge.state()
    }

    /// Replace the recognition listener.
    pub fn set_listener(&self, listener: Option<Arc<dyn RecognitionListener>>) {
        self.bus.set_listener(listener);
    }

    /// Replace the debug listener.
    pub fn set_debug_listener(&self, listener: Option<Arc<dyn DebugListener>>) {
        self.bus.set_debug_listener(listener);
    }

    /// Candidate POIs for tagging (`false`) or search (`true`).
    pub fn get_poi_shortlist(&self, for_search: bool) -> Vec<Poi> {
        self.engine.get_poi_shortlist(for_search)
    }

    /// Associate `poi` with `snapshot`.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::NotFound`] when the engine no longer holds the snapshot.
    pub fn tag_snapshot(&self, snapshot: &Snapshot, poi: &Poi) -> Result<(), Error> {
        self.engine
            .tag_snapshot(snapshot, poi)
            .map_err(map_engine_error)
    }

    /// Confirm the recognition held for `id`.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::NotFound`] when the engine no longer holds the snapshot.
    pub fn confirm_recognition(&self, id: SnapshotId) -> Result<(), Error> {
        self.engine.confirm_recognition(id).map_err(map_engine_error)
    }

    /// Reject the recognition held for `id`.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::NotFound`] when the engine no longer holds the snapshot.
    pub fn reject_recognition(&self, id: SnapshotId) -> Result<(), Error> {
        self.engine.reject_recognition(id).map_err(map_engine_error)
    }

    /// Re-deliver snapshot `id` to the recognition listener.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::NotFound`] when `id` is not the last recognised snapshot.
    pub fn get_snapshot(&self, id: SnapshotId) -> Result<(), Error> {
        if self.engine.get_snapshot(id) {
            Ok(())
        } else {
            Err(Error::not_found(format!("snapshot {id} is not available")))
        }
    }

    /// Ask the engine to capture a snapshot.
    pub fn take_snapshot(&self) -> bool {
        self.engine.take_snapshot()
    }

    /// Ask the engine to issue a fresh cache request.
    pub fn force_cache_refresh(&self) {
        self.engine.force_cache_refresh();
    }

    /// Last location the engine accepted.
    pub fn current_location(&self) -> Option<LocationFix> {
        self.engine.current_location()
    }

    /// Anonymous device id sent to the backend.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Stop everything and drain queued work and notifications.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.scheduler.shutdown().await;
        self.bus.shutdown().await;
    }

    /// Wait until every notification published so far is delivered.
    pub async fn flush_notifications(&self) {
        self.bus.flush().await;
    }
}

fn map_engine_error(err: RecognitionEngineError) -> Error {
    match err {
        RecognitionEngineError::NotFound { .. } => Error::not_found(err.to_string()),
        RecognitionEngineError::Rejected { .. } => Error::invalid_request(err.to_string()),
    }
}

impl EngineEvents for Urbo {
    fn on_recognition(&self, snapshot: Snapshot) {
        let snapshot_id = snapshot.id;
        match self.scheduler.submit_recognition_event(snapshot) {
            Ok(Submission::Queued) => debug!(snapshot_id = %snapshot_id, "recognition event queued"),
            Ok(Submission::Duplicate) => {
                debug!(snapshot_id = %snapshot_id, "recognition event already submitted");
            }
            Err(err) => warn!(snapshot_id = %snapshot_id, error = %err, "recognition event not queued"),
        }
    }

    fn on_cache_request(&self, request_id: RequestId, fix: LocationFix) {
        match self.scheduler.submit_cache_request(request_id, fix) {
            Ok(()) => {}
            Err(err) if err.code() == ErrorCode::Conflict => {
                debug!(request_id = %request_id, "cache request already in flight");
            }
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "cache request not queued");
                self.engine.poi_cache_request_callback(request_id, fix, None);
            }
        }
    }

    fn on_snapshot_image_ready(&self, file_name: &str, image: Vec<u8>) {
        if let Err(err) = self.images.write(file_name, &image) {
            error!(file_name, error = %err, "snapshot image not stored");
        }
    }

    fn on_error(&self, tag: &str, message: &str, error: &str) {
        error!(tag, error, "{message}");
    }

    fn on_diagnostic(&self, diagnostic: EngineDiagnostic) {
        let event = match diagnostic {
            EngineDiagnostic::Info { key, value } => DiagnosticEvent::Field { key, value },
            EngineDiagnostic::Error { message } => DiagnosticEvent::Toast { message },
        };
        self.bus.publish(Notification::Diagnostic(event));
    }

    fn on_state_changed(&self, state: RecognitionState, poi: Option<Poi>, snapshot_id: SnapshotId) {
        self.bus.publish(Notification::StateChanged {
            state,
            poi,
            snapshot_id,
        });
    }

    fn on_snapshot(&self, snapshot: Snapshot) {
        self.bus.publish(Notification::SnapshotReady(snapshot));
    }
}

#[cfg(test)]
mod tests;
