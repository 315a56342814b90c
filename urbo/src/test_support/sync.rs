//! Deterministic time and outcome capture for scheduler and bridge tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use tokio::sync::mpsc;

use crate::domain::{
    CacheRefreshOutcome, EventUploadOutcome, SchedulerObserver, SyncSleeper,
};

pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}",)
            }
        };
        *self.lock_clock() += delta;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        *self.lock_clock() += TimeDelta::seconds(seconds);
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl SyncSleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Records every requested sleep and, when built with a clock, advances it
/// by the slept duration instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
    clock: Option<Arc<MutableClock>>,
}

impl RecordingSleeper {
    pub fn advancing(clock: Arc<MutableClock>) -> Self {
        Self {
            slept: Mutex::new(Vec::new()),
            clock: Some(clock),
        }
    }

    pub fn durations(&self) -> Vec<Duration> {
        match self.slept.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => panic!("sleeper mutex"),
        }
    }
}

#[async_trait]
impl SyncSleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        match self.slept.lock() {
            Ok(mut entries) => entries.push(duration),
            Err(_) => panic!("sleeper mutex"),
        }
        if let Some(clock) = &self.clock {
            clock.advance(duration);
        }
    }
}

/// Forwards scheduler outcomes to channels a test can await.
pub struct ChannelObserver {
    cache: mpsc::UnboundedSender<CacheRefreshOutcome>,
    events: mpsc::UnboundedSender<EventUploadOutcome>,
}

/// Receiving ends of a [`ChannelObserver`].
pub struct ObservedOutcomes {
    pub cache: mpsc::UnboundedReceiver<CacheRefreshOutcome>,
    pub events: mpsc::UnboundedReceiver<EventUploadOutcome>,
}

impl ChannelObserver {
    pub fn new() -> (Arc<Self>, ObservedOutcomes) {
        let (cache, cache_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self { cache, events }),
            ObservedOutcomes {
                cache: cache_rx,
                events: events_rx,
            },
        )
    }
}

impl SchedulerObserver for ChannelObserver {
    fn cache_refresh_finished(&self, outcome: &CacheRefreshOutcome) {
        let _ = self.cache.send(outcome.clone());
    }

    fn event_upload_finished(&self, outcome: &EventUploadOutcome) {
        let _ = self.events.send(outcome.clone());
    }
}

impl ObservedOutcomes {
    /// Next cache outcome, failing the test after `wait`.
    pub async fn next_cache(&mut self, wait: Duration) -> CacheRefreshOutcome {
        match tokio::time::timeout(wait, self.cache.recv()).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => panic!("cache outcome channel closed"),
            Err(_) => panic!("no cache outcome within {wait:?}"),
        }
    }

    /// Next event outcome, failing the test after `wait`.
    pub async fn next_event(&mut self, wait: Duration) -> EventUploadOutcome {
        match tokio::time::timeout(wait, self.events.recv()).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => panic!("event outcome channel closed"),
            Err(_) => panic!("no event outcome within {wait:?}"),
        }
    }
}
