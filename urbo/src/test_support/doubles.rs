//! Hand-written port doubles shared by scheduler, facade, and behaviour tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use crate::domain::ports::{
    BlobSink, BlobSinkError, EngineEvents, ImageLease, ImageStore, ImageStoreError,
    LocationRequestSettings, LocationSource, LocationSourceError, LocationUpdate, PoiBackend,
    PoiBackendError, PoiListing, PoiQuery, PutRequest, PutResponse, RecognitionEngine,
    RecognitionEngineError, UploadTarget,
};
use crate::domain::{LocationFix, Poi, PoiCache, RequestId, Snapshot, SnapshotId};

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("{name} mutex"),
    }
}

/// One terminal answer received by [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub request_id: RequestId,
    pub fix: LocationFix,
    pub pois: Option<Vec<Poi>>,
}

/// Recognition engine double backed by a [`PoiCache`].
pub struct RecordingEngine {
    cache: Mutex<PoiCache>,
    deliveries: Mutex<Vec<Delivery>>,
    delivered: Notify,
    pushed: Mutex<Vec<LocationFix>>,
    last_snapshot: Mutex<Option<Snapshot>>,
    events: Mutex<Option<Weak<dyn EngineEvents>>>,
    accept_listings: AtomicBool,
    forced_refreshes: AtomicUsize,
    feed_restarts: AtomicUsize,
    feed_stops: AtomicUsize,
    updates_applied: AtomicUsize,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self {
            cache: Mutex::new(PoiCache::new()),
            deliveries: Mutex::new(Vec::new()),
            delivered: Notify::new(),
            pushed: Mutex::new(Vec::new()),
            last_snapshot: Mutex::new(None),
            events: Mutex::new(None),
            accept_listings: AtomicBool::new(true),
            forced_refreshes: AtomicUsize::new(0),
            feed_restarts: AtomicUsize::new(0),
            feed_stops: AtomicUsize::new(0),
            updates_applied: AtomicUsize::new(0),
        }
    }
}

impl RecordingEngine {
    pub fn rejecting_listings() -> Self {
        let engine = Self::default();
        engine.accept_listings.store(false, Ordering::SeqCst);
        engine
    }

    /// Create a client-only POI in the engine cache.
    pub fn create_local_poi(&self, name: &str) -> Poi {
        lock(&self.cache, "cache").create_local(name)
    }

    pub fn cached_poi(&self, poi: &Poi) -> Option<Poi> {
        lock(&self.cache, "cache").get(poi.client_id).cloned()
    }

    pub fn cache_len(&self) -> usize {
        lock(&self.cache, "cache").len()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        lock(&self.deliveries, "deliveries").clone()
    }

    pub fn deliveries_for(&self, request_id: RequestId) -> Vec<Delivery> {
        self.deliveries()
            .into_iter()
            .filter(|delivery| delivery.request_id == request_id)
            .collect()
    }

    /// Wait until at least `count` terminal answers have arrived.
    pub async fn wait_for_deliveries(&self, count: usize) {
        loop {
            let notified = self.delivered.notified();
            if lock(&self.deliveries, "deliveries").len() >= count {
                return;
            }
            notified.await;
        }
    }

    pub fn pushed_locations(&self) -> Vec<LocationFix> {
        lock(&self.pushed, "pushed").clone()
    }

    pub fn forced_refreshes(&self) -> usize {
        self.forced_refreshes.load(Ordering::SeqCst)
    }

    pub fn feed_restarts(&self) -> usize {
        self.feed_restarts.load(Ordering::SeqCst)
    }

    pub fn feed_stops(&self) -> usize {
        self.feed_stops.load(Ordering::SeqCst)
    }

    pub fn updates_applied(&self) -> usize {
        self.updates_applied.load(Ordering::SeqCst)
    }

    pub fn is_bound(&self) -> bool {
        self.bound_events().is_some()
    }

    /// Record `snapshot` as the last recognition and raise it through the
    /// bound event sink.
    pub fn emit_recognition(&self, snapshot: Snapshot) {
        *lock(&self.last_snapshot, "snapshot") = Some(snapshot.clone());
        if let Some(events) = self.bound_events() {
            events.on_recognition(snapshot);
        }
    }

    /// Raise a cache request through the bound event sink.
    pub fn emit_cache_request(&self, request_id: RequestId, fix: LocationFix) {
        if let Some(events) = self.bound_events() {
            events.on_cache_request(request_id, fix);
        }
    }

    fn bound_events(&self) -> Option<Arc<dyn EngineEvents>> {
        lock(&self.events, "events")
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

impl RecognitionEngine for RecordingEngine {
    fn push_location(&self, fix: LocationFix) {
        lock(&self.pushed, "pushed").push(fix);
    }

    fn take_snapshot(&self) -> bool {
        self.bound_events().is_some()
    }

    fn get_snapshot(&self, id: SnapshotId) -> bool {
        let snapshot = lock(&self.last_snapshot, "snapshot")
            .as_ref()
            .filter(|snapshot| snapshot.id == id)
            .cloned();
        let Some(snapshot) = snapshot else {
            return false;
        };
        if let Some(events) = self.bound_events() {
            events.on_snapshot(snapshot);
        }
        true
    }

    fn get_poi_shortlist(&self, _for_search: bool) -> Vec<Poi> {
        lock(&self.cache, "cache").iter().cloned().collect()
    }

    fn tag_snapshot(&self, snapshot: &Snapshot, poi: &Poi) -> Result<(), RecognitionEngineError> {
        let mut last = lock(&self.last_snapshot, "snapshot");
        match last.as_mut() {
            Some(held) if held.id == snapshot.id => {
                held.poi = Some(poi.clone());
                Ok(())
            }
            _ => Err(RecognitionEngineError::not_found(snapshot.id.0)),
        }
    }

    fn confirm_recognition(&self, id: SnapshotId) -> Result<(), RecognitionEngineError> {
        match lock(&self.last_snapshot, "snapshot").as_ref() {
            Some(held) if held.id == id => Ok(()),
            _ => Err(RecognitionEngineError::not_found(id.0)),
        }
    }

    fn reject_recognition(&self, id: SnapshotId) -> Result<(), RecognitionEngineError> {
        let mut last = lock(&self.last_snapshot, "snapshot");
        match last.as_ref() {
            Some(held) if held.id == id => {
                *last = None;
                Ok(())
            }
            _ => Err(RecognitionEngineError::not_found(id.0)),
        }
    }

    fn force_cache_refresh(&self) {
        self.forced_refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn current_location(&self) -> Option<LocationFix> {
        lock(&self.pushed, "pushed").last().copied()
    }

    fn restart_live_feed(&self) {
        self.feed_restarts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_live_feed(&self) {
        self.feed_stops.fetch_add(1, Ordering::SeqCst);
    }

    fn poi_cache_request_callback(
        &self,
        request_id: RequestId,
        fix: LocationFix,
        pois: Option<Vec<Poi>>,
    ) -> bool {
        let accepted = pois.is_some() && self.accept_listings.load(Ordering::SeqCst);
        if accepted {
            if let Some(pois) = &pois {
                lock(&self.cache, "cache").apply_listing(pois.clone());
            }
        }
        lock(&self.deliveries, "deliveries").push(Delivery {
            request_id,
            fix,
            pois,
        });
        self.delivered.notify_waiters();
        accepted
    }

    fn poi_cache_update_callback(&self, response: &PutResponse) {
        lock(&self.cache, "cache").apply_put_response(response);
        self.updates_applied.fetch_add(1, Ordering::SeqCst);
    }

    fn bind_events(&self, events: Weak<dyn EngineEvents>) {
        *lock(&self.events, "events") = Some(events);
    }
}

/// Optional gate that parks backend calls until released.
struct Gate {
    entered: mpsc::UnboundedSender<usize>,
    release: Arc<Notify>,
}

/// Backend double replaying scripted results in order.
///
/// An exhausted script answers with a transport error.
pub struct ScriptedBackend {
    listings: Mutex<VecDeque<Result<PoiListing, PoiBackendError>>>,
    puts: Mutex<VecDeque<Result<PutResponse, PoiBackendError>>>,
    queries: Mutex<Vec<PoiQuery>>,
    put_requests: Mutex<Vec<PutRequest>>,
    active_puts: AtomicUsize,
    max_active_puts: AtomicUsize,
    put_gate: Option<Gate>,
    panic_on_listing: bool,
}

impl ScriptedBackend {
    pub fn new(
        listings: Vec<Result<PoiListing, PoiBackendError>>,
        puts: Vec<Result<PutResponse, PoiBackendError>>,
    ) -> Self {
        Self {
            listings: Mutex::new(listings.into()),
            puts: Mutex::new(puts.into()),
            queries: Mutex::new(Vec::new()),
            put_requests: Mutex::new(Vec::new()),
            active_puts: AtomicUsize::new(0),
            max_active_puts: AtomicUsize::new(0),
            put_gate: None,
            panic_on_listing: false,
        }
    }

    /// Panic inside every `get_pois` call after recording the query.
    pub fn panicking_on_listing(mut self) -> Self {
        self.panic_on_listing = true;
        self
    }

    /// Park every put until `release` is notified, reporting entries on
    /// `entered`.
    pub fn with_put_gate(
        mut self,
        entered: mpsc::UnboundedSender<usize>,
        release: Arc<Notify>,
    ) -> Self {
        self.put_gate = Some(Gate { entered, release });
        self
    }

    pub fn queries(&self) -> Vec<PoiQuery> {
        lock(&self.queries, "queries").clone()
    }

    pub fn put_requests(&self) -> Vec<PutRequest> {
        lock(&self.put_requests, "put requests").clone()
    }

    pub fn max_active_puts(&self) -> usize {
        self.max_active_puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoiBackend for ScriptedBackend {
    async fn get_pois(&self, query: &PoiQuery) -> Result<PoiListing, PoiBackendError> {
        lock(&self.queries, "queries").push(query.clone());
        if self.panic_on_listing {
            panic!("scripted listing panic");
        }
        lock(&self.listings, "listings")
            .pop_front()
            .unwrap_or_else(|| Err(PoiBackendError::transport("listing script exhausted")))
    }

    async fn put(&self, request: &PutRequest) -> Result<PutResponse, PoiBackendError> {
        lock(&self.put_requests, "put requests").push(request.clone());
        let active = self.active_puts.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_puts.fetch_max(active, Ordering::SeqCst);
        if let Some(gate) = &self.put_gate {
            let _ = gate.entered.send(active);
            gate.release.notified().await;
        }
        self.active_puts.fetch_sub(1, Ordering::SeqCst);
        lock(&self.puts, "puts")
            .pop_front()
            .unwrap_or_else(|| Err(PoiBackendError::transport("put script exhausted")))
    }
}

/// Blob sink double recording object keys.
#[derive(Default)]
pub struct RecordingBlobSink {
    objects: Mutex<Vec<(UploadTarget, String, usize)>>,
    failing: AtomicBool,
}

impl RecordingBlobSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    /// `(target, key, byte length)` for every accepted object.
    pub fn objects(&self) -> Vec<(UploadTarget, String, usize)> {
        lock(&self.objects, "objects").clone()
    }
}

#[async_trait]
impl BlobSink for RecordingBlobSink {
    async fn put_object(
        &self,
        target: &UploadTarget,
        key: &str,
        body: Vec<u8>,
    ) -> Result<(), BlobSinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BlobSinkError::transport("blob store unreachable"));
        }
        lock(&self.objects, "objects").push((target.clone(), key.to_owned(), body.len()));
        Ok(())
    }
}

/// Image store double keeping images in memory.
#[derive(Default)]
pub struct InMemoryImageStore {
    images: Mutex<HashMap<String, Vec<u8>>>,
    leases: Arc<Mutex<HashMap<String, usize>>>,
}

struct LeasePin {
    leases: Arc<Mutex<HashMap<String, usize>>>,
    file_name: String,
}

impl Drop for LeasePin {
    fn drop(&mut self) {
        let mut leases = lock(&self.leases, "leases");
        if let Some(count) = leases.get_mut(&self.file_name) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                leases.remove(&self.file_name);
            }
        }
    }
}

impl InMemoryImageStore {
    pub fn contains(&self, file_name: &str) -> bool {
        lock(&self.images, "images").contains_key(file_name)
    }

    pub fn len(&self) -> usize {
        lock(&self.images, "images").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ImageStore for InMemoryImageStore {
    fn generate_file_name(&self) -> String {
        format!("{}.jpg", Uuid::new_v4())
    }

    fn write(&self, file_name: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        lock(&self.images, "images").insert(file_name.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn lease(&self, file_name: &str) -> Result<ImageLease, ImageStoreError> {
        let bytes = lock(&self.images, "images")
            .get(file_name)
            .cloned()
            .ok_or_else(|| ImageStoreError::not_found(file_name))?;
        *lock(&self.leases, "leases")
            .entry(file_name.to_owned())
            .or_insert(0) += 1;
        let pin = LeasePin {
            leases: Arc::clone(&self.leases),
            file_name: file_name.to_owned(),
        };
        Ok(ImageLease::new(file_name, bytes, pin))
    }

    fn remove(&self, file_name: &str) -> Result<bool, ImageStoreError> {
        if lock(&self.leases, "leases").contains_key(file_name) {
            return Ok(false);
        }
        Ok(lock(&self.images, "images").remove(file_name).is_some())
    }
}

/// Location source double driven by the test through a command channel.
pub struct ScriptedLocationSource {
    connects: Mutex<VecDeque<Result<(), LocationSourceError>>>,
    last_known: Mutex<Option<LocationFix>>,
    subscribers: mpsc::UnboundedSender<mpsc::UnboundedSender<LocationUpdate>>,
    connect_calls: AtomicUsize,
    removals: AtomicUsize,
    requested: Mutex<Vec<LocationRequestSettings>>,
    provider_enabled: Mutex<Result<bool, LocationSourceError>>,
}

/// Test-side handle receiving each new update subscription.
pub struct LocationFeed {
    subscriptions: mpsc::UnboundedReceiver<mpsc::UnboundedSender<LocationUpdate>>,
}

impl LocationFeed {
    /// Wait for the bridge's next subscription.
    pub async fn next_subscription(&mut self) -> mpsc::UnboundedSender<LocationUpdate> {
        match self.subscriptions.recv().await {
            Some(sender) => sender,
            None => panic!("location source dropped"),
        }
    }
}

impl ScriptedLocationSource {
    /// Build a source whose `connect` calls replay `connects`, then succeed.
    pub fn new(
        connects: Vec<Result<(), LocationSourceError>>,
        last_known: Option<LocationFix>,
    ) -> (Self, LocationFeed) {
        let (subscribers, subscriptions) = mpsc::unbounded_channel();
        (
            Self {
                connects: Mutex::new(connects.into()),
                last_known: Mutex::new(last_known),
                subscribers,
                connect_calls: AtomicUsize::new(0),
                removals: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
                provider_enabled: Mutex::new(Ok(true)),
            },
            LocationFeed { subscriptions },
        )
    }

    pub fn set_provider_enabled(&self, enabled: Result<bool, LocationSourceError>) {
        *lock(&self.provider_enabled, "provider") = enabled;
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn removals(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }

    pub fn requested_settings(&self) -> Vec<LocationRequestSettings> {
        lock(&self.requested, "requested").clone()
    }
}

#[async_trait]
impl LocationSource for ScriptedLocationSource {
    async fn connect(&self) -> Result<(), LocationSourceError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.connects, "connects").pop_front().unwrap_or(Ok(()))
    }

    async fn last_known_location(&self) -> Result<Option<LocationFix>, LocationSourceError> {
        Ok(*lock(&self.last_known, "last known"))
    }

    async fn request_updates(
        &self,
        settings: LocationRequestSettings,
    ) -> Result<mpsc::UnboundedReceiver<LocationUpdate>, LocationSourceError> {
        lock(&self.requested, "requested").push(settings);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .send(sender)
            .map_err(|_| LocationSourceError::unavailable("feed handle dropped"))?;
        Ok(receiver)
    }

    async fn remove_updates(&self) {
        self.removals.fetch_add(1, Ordering::SeqCst);
    }

    fn is_provider_enabled(&self) -> Result<bool, LocationSourceError> {
        lock(&self.provider_enabled, "provider").clone()
    }
}
