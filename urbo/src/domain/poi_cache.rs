//! In-memory POI cache that recognition engines can embed.
//!
//! The cache is mutated only through the two reconciliation entry points:
//! [`PoiCache::apply_listing`] for cache-request results and
//! [`PoiCache::apply_put_response`] for put acknowledgements. The latter is
//! the only place the client-only flag is cleared.

use std::collections::BTreeMap;

use super::ports::PutResponse;
use super::{Poi, PoiClientId};

/// Client ids below this bound are handed out sequentially to POIs created
/// on the device; derived ids from [`PoiClientId::from_server_id`] sit above.
const LOCAL_ID_CEILING: u64 = 1 << 63;

/// POI cache keyed by client id.
#[derive(Debug, Default, Clone)]
pub struct PoiCache {
    pois: BTreeMap<PoiClientId, Poi>,
    next_local_id: u64,
}

impl PoiCache {
    /// Build an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached POIs.
    pub fn len(&self) -> usize {
        self.pois.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }

    /// Look up a POI by client id.
    pub fn get(&self, client_id: PoiClientId) -> Option<&Poi> {
        self.pois.get(&client_id)
    }

    /// Look up a POI by backend id.
    pub fn find_by_server_id(&self, server_id: &str) -> Option<&Poi> {
        self.pois
            .values()
            .find(|poi| poi.server_id.as_deref() == Some(server_id))
    }

    /// POIs still waiting for backend creation.
    pub fn client_only(&self) -> impl Iterator<Item = &Poi> {
        self.pois.values().filter(|poi| poi.client_only)
    }

    /// All cached POIs ordered by client id.
    pub fn iter(&self) -> impl Iterator<Item = &Poi> {
        self.pois.values()
    }

    /// Create a client-only POI with a fresh local id.
    ///
    /// ```
    /// use urbo::domain::PoiCache;
    ///
    /// let mut cache = PoiCache::new();
    /// let poi = cache.create_local("Cafe X");
    /// assert!(poi.client_only);
    /// assert_eq!(cache.client_only().count(), 1);
    /// ```
    pub fn create_local(&mut self, name: impl Into<String>) -> Poi {
        self.next_local_id = (self.next_local_id + 1) % LOCAL_ID_CEILING;
        let poi = Poi::client_created(PoiClientId(self.next_local_id), name);
        self.pois.insert(poi.client_id, poi.clone());
        poi
    }

    /// Merge a cache-request listing. Returns the number of POIs stored.
    ///
    /// Listed POIs replace cached entries with the same client id; local
    /// client-only entries are kept untouched.
    pub fn apply_listing(&mut self, pois: Vec<Poi>) -> usize {
        let mut stored = 0;
        for poi in pois {
            if self
                .pois
                .get(&poi.client_id)
                .is_some_and(|existing| existing.client_only && poi.server_id.is_none())
            {
                continue;
            }
            self.pois.insert(poi.client_id, poi);
            stored += 1;
        }
        stored
    }

    /// Apply a put acknowledgement. Returns the number of POIs whose
    /// client-only flag was cleared.
    pub fn apply_put_response(&mut self, response: &PutResponse) -> usize {
        let mut cleared = 0;
        for creation in &response.created {
            if let Some(poi) = self.pois.get_mut(&creation.client_id) {
                if poi.client_only {
                    cleared += 1;
                }
                poi.server_id = Some(creation.server_id.clone());
                poi.client_only = false;
            }
        }
        for poi in &response.pois {
            if poi.server_id.is_some() {
                self.pois.insert(poi.client_id, poi.clone());
            }
        }
        cleared
    }
}
