//! In-flight bookkeeping for cache requests and snapshot uploads.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::domain::SnapshotId;

/// Set of keys currently owned by a queued or running job.
pub(super) struct InFlight<K> {
    keys: Mutex<HashSet<K>>,
}

impl<K: Eq + Hash + Copy> InFlight<K> {
    pub(super) fn new() -> Self {
        Self {
            keys: Mutex::new(HashSet::new()),
        }
    }

    /// Claim `key`; `None` when it is already claimed.
    pub(super) fn claim(self: &Arc<Self>, key: K) -> Option<InFlightGuard<K>> {
        let mut keys = self.lock();
        keys.insert(key).then(|| InFlightGuard {
            owner: Arc::clone(self),
            key,
        })
    }

    /// Claim `key` unless it is in flight or `settled` reports it finished.
    ///
    /// `settled` runs after the claim, so a job that records its result
    /// before releasing the key is always observed.
    pub(super) fn claim_unsettled(
        self: &Arc<Self>,
        key: K,
        settled: impl FnOnce(&K) -> bool,
    ) -> Result<InFlightGuard<K>, ClaimRefused> {
        let guard = self.claim(key).ok_or(ClaimRefused::InFlight)?;
        if settled(&key) {
            return Err(ClaimRefused::Settled);
        }
        Ok(guard)
    }

    pub(super) fn contains(&self, key: &K) -> bool {
        self.lock().contains(key)
    }

    fn release(&self, key: &K) {
        self.lock().remove(key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<K>> {
        match self.keys.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Why [`InFlight::claim_unsettled`] refused a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ClaimRefused {
    /// Another job owns the key.
    InFlight,
    /// The key already finished.
    Settled,
}

/// Releases its key when dropped, whether the job finished or was
/// discarded unqueued.
pub(super) struct InFlightGuard<K: Eq + Hash + Copy> {
    owner: Arc<InFlight<K>>,
    key: K,
}

impl<K: Eq + Hash + Copy> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        self.owner.release(&self.key);
    }
}

/// Bounded memory of acknowledged snapshot ids, oldest forgotten first.
pub(super) struct Acknowledged {
    capacity: usize,
    state: Mutex<(HashSet<SnapshotId>, VecDeque<SnapshotId>)>,
}

impl Acknowledged {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new((HashSet::new(), VecDeque::new())),
        }
    }

    pub(super) fn contains(&self, id: SnapshotId) -> bool {
        match self.state.lock() {
            Ok(state) => state.0.contains(&id),
            Err(poisoned) => poisoned.into_inner().0.contains(&id),
        }
    }

    pub(super) fn record(&self, id: SnapshotId) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (set, order) = &mut *state;
        if !set.insert(id) {
            return;
        }
        order.push_back(id);
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                set.remove(&oldest);
            }
        }
    }
}
