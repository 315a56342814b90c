//! Server-paced cache refresh for one request id.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{CacheRequest, Poi};
use crate::domain::ports::{PoiBackend, RecognitionEngine};

use super::mapping::{elapsed_secs, within_ceiling};
use super::{CacheRefreshOutcome, SchedulerShared};

/// Poll bookkeeping owned by the task executing one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryState {
    /// Delay in seconds before the next poll; zero means poll now.
    pub next_delay_secs: u64,
    /// Backend calls issued so far.
    pub polls: u32,
}

/// One cache request plus its retry state.
///
/// A task dropped before its terminal answer, e.g. after a panic in the
/// backend, answers the engine with `None` on drop.
pub(super) struct CacheRefreshTask {
    request: CacheRequest,
    retry: RetryState,
    engine: Arc<dyn RecognitionEngine>,
    answered: bool,
}

impl CacheRefreshTask {
    pub(super) fn new(request: CacheRequest, engine: Arc<dyn RecognitionEngine>) -> Self {
        Self {
            request,
            retry: RetryState::default(),
            engine,
            answered: false,
        }
    }

    /// Poll until a final listing, an error, or the poll ceiling, then
    /// deliver exactly one terminal answer to the engine.
    pub(super) async fn run(
        mut self,
        shared: &SchedulerShared,
        backend: Arc<dyn PoiBackend>,
    ) -> CacheRefreshOutcome {
        let request_id = self.request.request_id;
        let query = self.request.query();
        let started_at = shared.clock.utc();
        let mut upload_target = None;

        loop {
            if self.retry.next_delay_secs > 0 {
                let delay = Duration::from_secs(self.retry.next_delay_secs);
                let now = shared.clock.utc();
                if !within_ceiling(started_at, now, delay, shared.config.poll_ceiling) {
                    warn!(
                        request_id = %request_id,
                        polls = self.retry.polls,
                        elapsed_secs = elapsed_secs(started_at, now),
                        hit_me_again_in = self.retry.next_delay_secs,
                        "cache request exceeded poll ceiling"
                    );
                    self.deliver(None);
                    return CacheRefreshOutcome::PollCeilingReached {
                        request_id,
                        polls: self.retry.polls,
                    };
                }
                debug!(
                    request_id = %request_id,
                    delay_secs = self.retry.next_delay_secs,
                    "waiting before re-poll"
                );
                shared.sleeper.sleep(delay).await;
            }

            self.retry.polls += 1;
            let listing = match backend.get_pois(&query).await {
                Ok(listing) => listing,
                Err(err) => {
                    warn!(request_id = %request_id, error = %err, "GET /pois failed");
                    self.deliver(None);
                    return CacheRefreshOutcome::Failed {
                        request_id,
                        polls: self.retry.polls,
                        error: err.to_string(),
                    };
                }
            };

            if listing.upload_target.is_some() {
                upload_target = listing.upload_target;
            }
            if listing.hit_me_again_in > 0 {
                info!(
                    request_id = %request_id,
                    pois = listing.pois.len(),
                    hit_me_again_in = listing.hit_me_again_in,
                    "backend asked to poll again"
                );
                self.retry.next_delay_secs = listing.hit_me_again_in;
                continue;
            }

            let poi_count = listing.pois.len();
            info!(request_id = %request_id, pois = poi_count, "cache request complete");
            let accepted = self.deliver(Some(listing.pois));
            if accepted {
                match upload_target {
                    Some(target) => shared.uploader.set_bucket(target.bucket, target.folder),
                    None => warn!(request_id = %request_id, "listing carried no upload target"),
                }
            }
            return CacheRefreshOutcome::Delivered {
                request_id,
                polls: self.retry.polls,
                poi_count,
                accepted,
            };
        }
    }

    fn deliver(&mut self, pois: Option<Vec<Poi>>) -> bool {
        self.answered = true;
        self.engine
            .poi_cache_request_callback(self.request.request_id, self.request.fix, pois)
    }
}

impl Drop for CacheRefreshTask {
    fn drop(&mut self) {
        if self.answered {
            return;
        }
        warn!(
            request_id = %self.request.request_id,
            polls = self.retry.polls,
            "cache request abandoned before a terminal answer"
        );
        self.deliver(None);
    }
}
