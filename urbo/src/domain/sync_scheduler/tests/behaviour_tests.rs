//! Behaviour-focused test cases mixing both protocols on one pool.

use super::*;

#[rstest]
#[tokio::test]
async fn polled_listing_lands_in_engine_cache_and_targets_uploads() {
    let mut harness = HarnessBuilder::new(ScriptedBackend::new(
        vec![
            Ok(listing(Vec::new(), 3, Some(("b", "f")))),
            Ok(listing(vec![tower()], 0, None)),
        ],
        vec![Ok(PutResponse::default())],
    ))
    .build();

    harness
        .scheduler
        .submit_cache_request(RequestId(1), fix())
        .expect("request queued");
    harness.outcomes.next_cache(WAIT).await;

    assert_eq!(harness.engine.cache_len(), 1);
    assert!(
        harness
            .sleeper
            .durations()
            .iter()
            .all(|slept| *slept >= Duration::from_secs(3))
    );

    let snapshot = snapshot_with(11, Some(tower()), &harness.images);
    let file_name = snapshot.image_file_name.clone();
    harness
        .scheduler
        .submit_recognition_event(snapshot)
        .expect("event queued");
    harness.outcomes.next_event(WAIT).await;

    let objects = harness.sink.objects();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].0, UploadTarget::new("b", "f"));
    assert_eq!(objects[0].1, format!("f/{file_name}"));
}

#[rstest]
#[tokio::test]
async fn sleeping_poll_keeps_its_worker_busy() {
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let mut builder = HarnessBuilder::new(ScriptedBackend::new(
        vec![
            Ok(listing(Vec::new(), 5, None)),
            Ok(listing(Vec::new(), 0, None)),
        ],
        vec![Ok(PutResponse::default())],
    ))
    .sleeper(Arc::new(ParkedSleeper {
        entered: entered_tx,
        release: Arc::clone(&release),
    }));
    builder.config.workers = 1;
    let mut harness = builder.build();

    harness
        .scheduler
        .submit_cache_request(RequestId(1), fix())
        .expect("request queued");
    entered_rx.recv().await.expect("poll loop sleeping");
    let snapshot = snapshot_with(1, None, &harness.images);
    harness
        .scheduler
        .submit_recognition_event(snapshot)
        .expect("event queued");
    tokio::task::yield_now().await;
    assert!(harness.backend.put_requests().is_empty());

    release.notify_one();
    let cache = harness.outcomes.next_cache(WAIT).await;
    let event = harness.outcomes.next_event(WAIT).await;

    assert_eq!(cache.request_id(), RequestId(1));
    assert_eq!(event.snapshot_id(), SnapshotId(1));
    assert_eq!(harness.backend.put_requests().len(), 1);
}

#[rstest]
#[tokio::test]
async fn failed_refresh_does_not_block_event_uploads() {
    let engine = RecordingEngine::default();
    let cafe = engine.create_local_poi("Cafe X");
    let mut harness = HarnessBuilder::new(ScriptedBackend::new(
        vec![Err(PoiBackendError::transport("unreachable"))],
        vec![Ok(PutResponse {
            created: vec![PoiCreation {
                client_id: cafe.client_id,
                server_id: "srv-7".to_owned(),
            }],
            pois: Vec::new(),
        })],
    ))
    .engine(engine)
    .build();

    harness
        .scheduler
        .submit_cache_request(RequestId(9), fix())
        .expect("request queued");
    let snapshot = snapshot_with(2, Some(cafe.clone()), &harness.images);
    harness
        .scheduler
        .submit_recognition_event(snapshot)
        .expect("event queued");

    let cache = harness.outcomes.next_cache(WAIT).await;
    let event = harness.outcomes.next_event(WAIT).await;

    assert!(matches!(cache, CacheRefreshOutcome::Failed { .. }));
    assert!(matches!(event, EventUploadOutcome::Acknowledged { .. }));
    assert_eq!(harness.engine.deliveries_for(RequestId(9))[0].pois, None);
    assert!(
        !harness
            .engine
            .cached_poi(&cafe)
            .expect("cafe cached")
            .client_only
    );
}
