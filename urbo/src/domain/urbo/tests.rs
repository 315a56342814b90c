//! Facade wiring tests: engine callbacks, configuration, and listeners.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rstest::rstest;
use tokio::sync::{Notify, mpsc};

use super::{Urbo, UrboOptions, UrboPorts, UrboRuntime};
use crate::domain::event_bus::{DebugListener, RecognitionListener};
use crate::domain::ports::{
    EngineDiagnostic, EngineEvents, LocationUpdate, PoiBackendError, PoiListing, PutResponse,
};
use crate::domain::{
    BridgeState, ErrorCode, EventUploadOutcome, LocationFix, Poi, PoiClientId, RecognitionState,
    RequestId, Snapshot, SnapshotId, StaticBackendFactory, SyncSchedulerConfig, SyncSleeper,
};
use crate::test_support::doubles::{
    InMemoryImageStore, LocationFeed, RecordingBlobSink, RecordingEngine, ScriptedBackend,
    ScriptedLocationSource,
};
use crate::test_support::sync::{ChannelObserver, ImmediateSleeper, MutableClock, ObservedOutcomes};

const WAIT: Duration = Duration::from_secs(5);
const ENDPOINT: &str = "https://odie.example.test/odie";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .expect("valid time")
}

fn fix() -> LocationFix {
    LocationFix::new(51.5, -0.12, 8.0, start()).expect("valid fix")
}

fn tower() -> Poi {
    Poi::server_known(PoiClientId::from_server_id("p-1"), "p-1", "Tower")
}

struct Harness {
    urbo: Arc<Urbo>,
    engine: Arc<RecordingEngine>,
    backend: Arc<ScriptedBackend>,
    images: Arc<InMemoryImageStore>,
    location: Arc<ScriptedLocationSource>,
    feed: LocationFeed,
    outcomes: ObservedOutcomes,
}

fn options(configured: bool) -> UrboOptions {
    UrboOptions {
        endpoint: configured.then(|| ENDPOINT.to_owned()),
        api_key: configured.then(|| "secret".to_owned()),
        scheduler: SyncSchedulerConfig {
            device_id: "abcd1234".to_owned(),
            ..SyncSchedulerConfig::default()
        },
        ..UrboOptions::default()
    }
}

fn harness_with(
    backend: ScriptedBackend,
    sleeper: Arc<dyn SyncSleeper>,
    options: UrboOptions,
) -> Harness {
    let engine = Arc::new(RecordingEngine::default());
    let backend = Arc::new(backend);
    let images = Arc::new(InMemoryImageStore::default());
    let (location, feed) = ScriptedLocationSource::new(Vec::new(), Some(fix()));
    let location = Arc::new(location);
    let (observer, outcomes) = ChannelObserver::new();
    let urbo = Urbo::with_runtime(
        engine.clone(),
        UrboPorts {
            backend_factory: Arc::new(StaticBackendFactory(backend.clone())),
            blob_sink: Arc::new(RecordingBlobSink::default()),
            images: images.clone(),
            location: location.clone(),
        },
        UrboRuntime {
            clock: Arc::new(MutableClock::new(start())),
            sleeper,
            observer: Some(observer),
        },
        options,
    )
    .expect("urbo builds");
    Harness {
        urbo,
        engine,
        backend,
        images,
        location,
        feed,
        outcomes,
    }
}

fn harness(backend: ScriptedBackend, configured: bool) -> Harness {
    harness_with(backend, Arc::new(ImmediateSleeper), options(configured))
}

fn idle_backend() -> ScriptedBackend {
    ScriptedBackend::new(Vec::new(), Vec::new())
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    fn push(&self, entry: String) {
        self.0.lock().expect("recorder mutex").push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().expect("recorder mutex").clone()
    }
}

impl RecognitionListener for Recorder {
    fn on_state_changed(&self, state: RecognitionState, poi: Option<&Poi>, snapshot_id: SnapshotId) {
        let name = poi.map_or("-", |poi| poi.name.as_str());
        self.push(format!("state {state:?} {name} {snapshot_id}"));
    }

    fn on_snapshot(&self, snapshot: &Snapshot) {
        self.push(format!("snapshot {}", snapshot.id));
    }
}

impl DebugListener for Recorder {
    fn set_field(&self, key: &str, value: &str) {
        self.push(format!("set {key}={value}"));
    }

    fn remove_field(&self, key: &str) {
        self.push(format!("remove {key}"));
    }

    fn clear_fields(&self) {
        self.push("clear".to_owned());
    }

    fn toast(&self, message: &str) {
        self.push(format!("toast {message}"));
    }
}

/// Parks every sleep until released.
struct ParkedSleeper {
    entered: mpsc::UnboundedSender<Duration>,
    release: Arc<Notify>,
}

#[async_trait]
impl SyncSleeper for ParkedSleeper {
    async fn sleep(&self, duration: Duration) {
        let _ = self.entered.send(duration);
        self.release.notified().await;
    }
}

#[rstest]
#[tokio::test]
async fn construction_binds_engine_and_refreshes_once_configured() {
    let harness = harness(idle_backend(), true);

    assert!(harness.engine.is_bound());
    assert_eq!(harness.engine.forced_refreshes(), 1);
    assert_eq!(harness.urbo.device_id(), "abcd1234");
}

#[rstest]
#[tokio::test]
async fn refresh_waits_for_both_endpoint_and_key() {
    let harness = harness(idle_backend(), false);
    assert_eq!(harness.engine.forced_refreshes(), 0);

    harness.urbo.set_endpoint(ENDPOINT).expect("endpoint accepted");
    assert_eq!(harness.engine.forced_refreshes(), 0);

    harness.urbo.set_api_key("secret").expect("key accepted");
    assert_eq!(harness.engine.forced_refreshes(), 1);
}

#[rstest]
#[case(Some("not a url"), None)]
#[case(None, Some("   "))]
#[tokio::test]
async fn malformed_options_are_rejected(
    #[case] endpoint: Option<&str>,
    #[case] api_key: Option<&str>,
) {
    let engine = Arc::new(RecordingEngine::default());
    let (location, _feed) = ScriptedLocationSource::new(Vec::new(), None);
    let result = Urbo::new(
        engine,
        UrboPorts {
            backend_factory: Arc::new(StaticBackendFactory(Arc::new(idle_backend()))),
            blob_sink: Arc::new(RecordingBlobSink::default()),
            images: Arc::new(InMemoryImageStore::default()),
            location: Arc::new(location),
        },
        UrboOptions {
            endpoint: endpoint.map(str::to_owned),
            api_key: api_key.map(str::to_owned),
            ..UrboOptions::default()
        },
    );

    let err = result.err().expect("options rejected");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[rstest]
#[tokio::test]
async fn cache_request_before_configuration_is_answered_with_none() {
    let harness = harness(idle_backend(), false);

    harness.engine.emit_cache_request(RequestId(4), fix());

    let deliveries = harness.engine.deliveries_for(RequestId(4));
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].pois, None);
    assert!(harness.backend.queries().is_empty());
}

#[rstest]
#[tokio::test]
async fn cache_request_is_served_through_the_scheduler() {
    let mut harness = harness(
        ScriptedBackend::new(
            vec![Ok(PoiListing {
                pois: vec![tower()],
                ..PoiListing::default()
            })],
            Vec::new(),
        ),
        true,
    );

    harness.engine.emit_cache_request(RequestId(1), fix());
    harness.outcomes.next_cache(WAIT).await;

    let deliveries = harness.engine.deliveries_for(RequestId(1));
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].pois, Some(vec![tower()]));
    assert_eq!(harness.backend.queries()[0].device_id, "abcd1234");
}

#[rstest]
#[tokio::test]
async fn duplicate_request_id_in_flight_gets_no_extra_answer() {
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let mut harness = harness_with(
        ScriptedBackend::new(
            vec![
                Ok(PoiListing {
                    hit_me_again_in: 2,
                    ..PoiListing::default()
                }),
                Ok(PoiListing::default()),
            ],
            Vec::new(),
        ),
        Arc::new(ParkedSleeper {
            entered: entered_tx,
            release: Arc::clone(&release),
        }),
        options(true),
    );

    harness.engine.emit_cache_request(RequestId(7), fix());
    entered_rx.recv().await.expect("poll loop sleeping");
    harness.engine.emit_cache_request(RequestId(7), fix());
    assert!(harness.engine.deliveries_for(RequestId(7)).is_empty());

    release.notify_one();
    harness.outcomes.next_cache(WAIT).await;

    let deliveries = harness.engine.deliveries_for(RequestId(7));
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].pois, Some(Vec::new()));
}

#[rstest]
#[tokio::test]
async fn recognition_uploads_stored_image_and_removes_it_when_acknowledged() {
    let mut harness = harness(
        ScriptedBackend::new(Vec::new(), vec![Ok(PutResponse::default())]),
        true,
    );
    harness
        .urbo
        .on_snapshot_image_ready("snap-3.jpg", vec![0xFF, 0xD8, 0xFF]);
    assert!(harness.images.contains("snap-3.jpg"));

    harness.engine.emit_recognition(Snapshot {
        id: SnapshotId(3),
        image_file_name: "snap-3.jpg".to_owned(),
        poi: Some(tower()),
        votes: Vec::new(),
        captured_at: start(),
    });
    let outcome = harness.outcomes.next_event(WAIT).await;

    assert!(matches!(outcome, EventUploadOutcome::Acknowledged { .. }));
    assert_eq!(harness.backend.put_requests().len(), 1);
    assert_eq!(harness.engine.updates_applied(), 1);
    assert!(!harness.images.contains("snap-3.jpg"));
}

#[rstest]
#[tokio::test]
async fn engine_notifications_reach_listeners_in_order() {
    let harness = harness(idle_backend(), true);
    let recorder = Arc::new(Recorder::default());
    harness.urbo.set_listener(Some(recorder.clone()));
    harness.urbo.set_debug_listener(Some(recorder.clone()));

    harness
        .urbo
        .on_state_changed(RecognitionState::Search, None, SnapshotId::INVALID);
    harness
        .urbo
        .on_state_changed(RecognitionState::Recognition, Some(tower()), SnapshotId(5));
    harness.urbo.on_diagnostic(EngineDiagnostic::Info {
        key: "fps".to_owned(),
        value: "24".to_owned(),
    });
    harness.urbo.on_diagnostic(EngineDiagnostic::Error {
        message: "camera lost".to_owned(),
    });
    harness.urbo.flush_notifications().await;

    assert_eq!(
        recorder.entries(),
        vec![
            "state Search - -1",
            "state Recognition Tower 5",
            "set fps=24",
            "toast camera lost",
        ]
    );
}

#[rstest]
#[tokio::test]
async fn get_snapshot_redelivers_only_the_last_recognition() {
    let harness = harness(idle_backend(), false);
    let recorder = Arc::new(Recorder::default());
    harness.urbo.set_listener(Some(recorder.clone()));
    harness.engine.emit_recognition(Snapshot {
        id: SnapshotId(8),
        image_file_name: "snap-8.jpg".to_owned(),
        poi: None,
        votes: Vec::new(),
        captured_at: start(),
    });

    harness.urbo.get_snapshot(SnapshotId(8)).expect("snapshot held");
    let missing = harness
        .urbo
        .get_snapshot(SnapshotId(9))
        .expect_err("unknown snapshot");
    harness.urbo.flush_notifications().await;

    assert_eq!(missing.code(), ErrorCode::NotFound);
    assert_eq!(recorder.entries(), vec!["snapshot 8"]);
}

#[rstest]
#[tokio::test]
async fn engine_rejections_map_to_not_found() {
    let harness = harness(idle_backend(), false);

    let confirm = harness
        .urbo
        .confirm_recognition(SnapshotId(1))
        .expect_err("nothing to confirm");
    let reject = harness
        .urbo
        .reject_recognition(SnapshotId(1))
        .expect_err("nothing to reject");

    assert_eq!(confirm.code(), ErrorCode::NotFound);
    assert_eq!(reject.code(), ErrorCode::NotFound);
}

#[rstest]
#[tokio::test]
async fn start_and_stop_drive_location_and_live_feed() {
    let mut harness = harness(idle_backend(), false);

    harness.urbo.start();
    let updates = harness.feed.next_subscription().await;
    updates
        .send(LocationUpdate::Fix(fix()))
        .expect("bridge listening");
    tokio::time::timeout(WAIT, async {
        while harness.engine.pushed_locations().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("fixes forwarded");

    assert_eq!(harness.engine.feed_restarts(), 1);
    assert_eq!(harness.urbo.current_location(), Some(fix()));

    harness.urbo.stop().await;
    assert_eq!(harness.engine.feed_stops(), 1);
    assert_eq!(harness.location.removals(), 1);
    assert_eq!(harness.urbo.location_state(), BridgeState::Disconnected);
}

#[rstest]
#[tokio::test]
async fn dropping_the_facade_unbinds_the_engine() {
    let harness = harness(idle_backend(), true);
    let engine = Arc::clone(&harness.engine);
    harness.urbo.shutdown().await;
    drop(harness);

    assert!(!engine.is_bound());
    engine.emit_cache_request(RequestId(2), fix());
    assert!(engine.deliveries().is_empty());
}

#[rstest]
#[tokio::test]
async fn failed_backend_call_is_answered_with_none() {
    let mut harness = harness(
        ScriptedBackend::new(
            vec![Err(PoiBackendError::timeout("deadline exceeded"))],
            Vec::new(),
        ),
        true,
    );

    harness.engine.emit_cache_request(RequestId(3), fix());
    harness.outcomes.next_cache(WAIT).await;

    assert_eq!(harness.engine.deliveries_for(RequestId(3))[0].pois, None);
}
