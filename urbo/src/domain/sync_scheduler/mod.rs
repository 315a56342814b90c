//! Scheduler for all backend-bound work.
//!
//! Cache refreshes and recognition event uploads share one fixed-size worker
//! pool. A cache refresh holds its worker for the whole server-paced poll
//! loop, including sleeps; an event upload holds it for the image upload and
//! the put. At most one job per request id and per snapshot id is queued or
//! running at any time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockable::Clock;
use tracing::{debug, error};

use crate::domain::ports::{ImageStore, RecognitionEngine};
use crate::domain::{
    BackendSlot, BlobUploader, CacheRequest, Error, LocationFix, RequestId, Snapshot, SnapshotId,
};

mod cache_refresh;
mod event_upload;
mod ledger;
mod mapping;
mod pool;
mod runtime;

use cache_refresh::CacheRefreshTask;
use event_upload::EventUploadTask;
use ledger::{Acknowledged, ClaimRefused, InFlight};
pub use cache_refresh::RetryState;
pub use pool::{PoolClosed, WorkerPool};
pub use runtime::{SyncSchedulerPorts, SyncSchedulerRuntime, TokioSleeper};

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSchedulerConfig {
    /// Worker count, matching the backend connection limit.
    pub workers: usize,
    /// Upper bound on the total time one cache request may spend polling.
    pub poll_ceiling: Duration,
    /// Country code sent with cache requests.
    pub country_code: Option<String>,
    /// Device id sent with cache requests and recognition events.
    pub device_id: String,
    /// How many acknowledged snapshot ids are remembered for dedupe.
    pub acknowledged_capacity: usize,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_ceiling: Duration::from_secs(300),
            country_code: None,
            device_id: String::new(),
            acknowledged_capacity: 512,
        }
    }
}

/// Async sleeping abstraction for server-directed poll delays.
#[async_trait]
pub trait SyncSleeper: Send + Sync {
    /// Suspend execution for `duration`.
    ///
    /// ```rust,no_run
    /// use async_trait::async_trait;
    /// use std::sync::Mutex;
    /// use std::time::Duration;
    /// use urbo::domain::SyncSleeper;
    ///
    /// #[derive(Default)]
    /// struct CountingSleeper(Mutex<u32>);
    ///
    /// #[async_trait]
    /// impl SyncSleeper for CountingSleeper {
    ///     async fn sleep(&self, _duration: Duration) {
    ///         *self.0.lock().expect("calls mutex") += 1;
    ///     }
    /// }
    /// # async fn demo() {
    /// let sleeper = CountingSleeper::default();
    /// sleeper.sleep(Duration::from_secs(3)).await;
    /// assert_eq!(*sleeper.0.lock().expect("calls mutex"), 1);
    /// # }
    /// ```
    async fn sleep(&self, duration: Duration);
}

/// Result of a recognition event submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The upload job was queued.
    Queued,
    /// The snapshot is already in flight or acknowledged; nothing queued.
    Duplicate,
}

/// How a cache request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRefreshOutcome {
    /// A final listing was delivered to the engine.
    Delivered {
        /// Request id.
        request_id: RequestId,
        /// Backend calls issued.
        polls: u32,
        /// POIs delivered.
        poi_count: usize,
        /// Whether the engine accepted the listing.
        accepted: bool,
    },
    /// The backend call failed; a `None` result was delivered.
    Failed {
        /// Request id.
        request_id: RequestId,
        /// Backend calls issued.
        polls: u32,
        /// Rendered backend error.
        error: String,
    },
    /// The next poll would exceed the ceiling; a `None` result was delivered.
    PollCeilingReached {
        /// Request id.
        request_id: RequestId,
        /// Backend calls issued.
        polls: u32,
    },
}

impl CacheRefreshOutcome {
    /// Request id the outcome belongs to.
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Delivered { request_id, .. }
            | Self::Failed { request_id, .. }
            | Self::PollCeilingReached { request_id, .. } => *request_id,
        }
    }
}

/// How a recognition event upload ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventUploadOutcome {
    /// The backend acknowledged the event.
    Acknowledged {
        /// Snapshot id.
        snapshot_id: SnapshotId,
        /// Whether the image reached object storage.
        image_uploaded: bool,
        /// POIs the backend created.
        created: usize,
    },
    /// The put failed and the event was dropped.
    Dropped {
        /// Snapshot id.
        snapshot_id: SnapshotId,
        /// Whether the image reached object storage.
        image_uploaded: bool,
        /// Rendered backend error.
        reason: String,
    },
}

impl EventUploadOutcome {
    /// Snapshot id the outcome belongs to.
    pub fn snapshot_id(&self) -> SnapshotId {
        match self {
            Self::Acknowledged { snapshot_id, .. } | Self::Dropped { snapshot_id, .. } => {
                *snapshot_id
            }
        }
    }
}

/// Receives job outcomes; used by diagnostics and tests.
pub trait SchedulerObserver: Send + Sync {
    /// A cache request delivered its terminal answer.
    fn cache_refresh_finished(&self, outcome: &CacheRefreshOutcome);

    /// An event upload finished.
    fn event_upload_finished(&self, outcome: &EventUploadOutcome);
}

/// State shared between the scheduler handle and its jobs.
pub(crate) struct SchedulerShared {
    backend: Arc<BackendSlot>,
    engine: Arc<dyn RecognitionEngine>,
    uploader: Arc<BlobUploader>,
    images: Arc<dyn ImageStore>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn SyncSleeper>,
    observer: Option<Arc<dyn SchedulerObserver>>,
    config: SyncSchedulerConfig,
    requests: Arc<InFlight<RequestId>>,
    uploads: Arc<InFlight<SnapshotId>>,
    acknowledged: Acknowledged,
}

/// Domain-owned sync scheduler.
pub struct SyncScheduler {
    shared: Arc<SchedulerShared>,
    pool: WorkerPool,
}

impl SyncScheduler {
    /// Build a scheduler using the Tokio sleeper. Must be called inside a
    /// Tokio runtime.
    /// ```rust,ignore
    /// let scheduler = SyncScheduler::new(ports, clock, config);
    /// ```
    pub fn new(
        ports: SyncSchedulerPorts,
        clock: Arc<dyn Clock>,
        config: SyncSchedulerConfig,
    ) -> Self {
        Self::with_runtime(ports, clock, SyncSchedulerRuntime::default(), config)
    }

    /// Build a scheduler with injected runtime abstractions.
    /// ```rust,ignore
    /// let scheduler = SyncScheduler::with_runtime(ports, clock, runtime, config);
    /// ```
    pub fn with_runtime(
        ports: SyncSchedulerPorts,
        clock: Arc<dyn Clock>,
        runtime: SyncSchedulerRuntime,
        config: SyncSchedulerConfig,
    ) -> Self {
        let pool = WorkerPool::new(config.workers);
        let shared = SchedulerShared {
            backend: ports.backend,
            engine: ports.engine,
            uploader: ports.uploader,
            images: ports.images,
            clock,
            sleeper: runtime.sleeper,
            observer: runtime.observer,
            acknowledged: Acknowledged::new(config.acknowledged_capacity),
            config,
            requests: Arc::new(InFlight::new()),
            uploads: Arc::new(InFlight::new()),
        };
        Self {
            shared: Arc::new(shared),
            pool,
        }
    }

    /// Queue a cache refresh for `request_id`.
    ///
    /// # Errors
    ///
    /// - [`ErrorCode::Configuration`](crate::domain::ErrorCode::Configuration)
    ///   when the backend is not configured; nothing is queued.
    /// - [`ErrorCode::Conflict`](crate::domain::ErrorCode::Conflict) when the
    ///   id is already queued or polling.
    /// - [`ErrorCode::Internal`](crate::domain::ErrorCode::Internal) after
    ///   shutdown.
    pub fn submit_cache_request(&self, request_id: RequestId, fix: LocationFix) -> Result<(), Error> {
        let backend = self.shared.backend.backend()?;
        let guard = self.shared.requests.claim(request_id).ok_or_else(|| {
            Error::conflict(format!("cache request {request_id} is already in flight"))
        })?;
        let request = CacheRequest {
            request_id,
            fix,
            country_code: self.shared.config.country_code.clone(),
            device_id: self.shared.config.device_id.clone(),
        };
        let task = CacheRefreshTask::new(request, Arc::clone(&self.shared.engine));
        let shared = Arc::clone(&self.shared);
        debug!(request_id = %request_id, "cache request queued");
        self.pool
            .submit(async move {
                let outcome = task.run(&shared, backend).await;
                drop(guard);
                if let Some(observer) = &shared.observer {
                    observer.cache_refresh_finished(&outcome);
                }
            })
            .map_err(|err| Error::internal(err.to_string()))
    }

    /// Queue the image upload and event put for `snapshot`.
    ///
    /// # Errors
    ///
    /// - [`ErrorCode::Configuration`](crate::domain::ErrorCode::Configuration)
    ///   when the backend is not configured.
    /// - [`ErrorCode::Internal`](crate::domain::ErrorCode::Internal) after
    ///   shutdown.
    pub fn submit_recognition_event(&self, snapshot: Snapshot) -> Result<Submission, Error> {
        let backend = self.shared.backend.backend()?;
        let snapshot_id = snapshot.id;
        let acknowledged = &self.shared.acknowledged;
        let guard = match self
            .shared
            .uploads
            .claim_unsettled(snapshot_id, |id| acknowledged.contains(*id))
        {
            Ok(guard) => guard,
            Err(ClaimRefused::InFlight) => {
                debug!(snapshot_id = %snapshot_id, "snapshot upload already in flight");
                return Ok(Submission::Duplicate);
            }
            Err(ClaimRefused::Settled) => {
                debug!(snapshot_id = %snapshot_id, "snapshot already acknowledged");
                return Ok(Submission::Duplicate);
            }
        };
        let task = EventUploadTask::new(snapshot);
        let shared = Arc::clone(&self.shared);
        self.pool
            .submit(async move {
                let outcome = task.run(&shared, backend).await;
                if matches!(outcome, EventUploadOutcome::Acknowledged { .. }) {
                    shared.acknowledged.record(snapshot_id);
                }
                drop(guard);
                if let Some(observer) = &shared.observer {
                    observer.event_upload_finished(&outcome);
                }
            })
            .map_err(|err| {
                error!(snapshot_id = %snapshot_id, "event upload not queued: {err}");
                Error::internal(err.to_string())
            })?;
        Ok(Submission::Queued)
    }

    /// Whether a job for `request_id` is queued or polling.
    pub fn is_request_in_flight(&self, request_id: RequestId) -> bool {
        self.shared.requests.contains(&request_id)
    }

    /// Worker count.
    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Stop accepting jobs, finish queued ones, and join the workers.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
