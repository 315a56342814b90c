//! Points of interest shared between the recognition engine cache and sync.

use std::fmt;

use sha2::{Digest, Sha256};

/// Client-side POI identifier, assigned when the POI enters the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoiClientId(pub u64);

impl PoiClientId {
    /// Stable client id for a POI the backend listed without one.
    ///
    /// The top bit is always set so derived ids never collide with the
    /// sequential ids handed out for client-created POIs.
    ///
    /// ```
    /// use urbo::domain::PoiClientId;
    ///
    /// let id = PoiClientId::from_server_id("poi-17");
    /// assert_eq!(id, PoiClientId::from_server_id("poi-17"));
    /// assert!(id.0 >= 1 << 63);
    /// ```
    pub fn from_server_id(server_id: &str) -> Self {
        let digest = Sha256::digest(server_id.as_bytes());
        let mut prefix = [0_u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(prefix) | (1 << 63))
    }
}

impl fmt::Display for PoiClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named, recognisable location entity.
///
/// ## Invariants
/// - `client_only` is true until the backend acknowledges creation; only the
///   sync path clears it, through [`crate::domain::PoiCache`].
/// - A POI that came from the backend always carries a `server_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    /// Local identifier.
    pub client_id: PoiClientId,
    /// Backend identifier, absent while the POI is client-only.
    pub server_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Optional first user comment attached when the POI was tagged.
    pub first_comment: Option<String>,
    /// True until the backend confirms creation.
    pub client_only: bool,
}

impl Poi {
    /// Build a POI the user just created on this device.
    ///
    /// # Examples
    /// ```
    /// use urbo::domain::{Poi, PoiClientId};
    ///
    /// let poi = Poi::client_created(PoiClientId(3), "Cafe X");
    /// assert!(poi.client_only);
    /// assert!(poi.server_id.is_none());
    /// ```
    pub fn client_created(client_id: PoiClientId, name: impl Into<String>) -> Self {
        Self {
            client_id,
            server_id: None,
            name: name.into(),
            first_comment: None,
            client_only: true,
        }
    }

    /// Build a POI known to the backend.
    pub fn server_known(
        client_id: PoiClientId,
        server_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            client_id,
            server_id: Some(server_id.into()),
            name: name.into(),
            first_comment: None,
            client_only: false,
        }
    }

    /// Attach a first comment.
    #[must_use]
    pub fn with_first_comment(mut self, comment: impl Into<String>) -> Self {
        self.first_comment = Some(comment.into());
        self
    }
}

/// One recognition vote: a candidate POI and its confidence score.
#[derive(Debug, Clone, PartialEq)]
pub struct PoiVote {
    /// Candidate POI.
    pub poi: Poi,
    /// Confidence score reported by the engine.
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a", "b")]
    #[case("poi-1", "poi-2")]
    fn derived_ids_differ_per_server_id(#[case] left: &str, #[case] right: &str) {
        assert_ne!(
            PoiClientId::from_server_id(left),
            PoiClientId::from_server_id(right)
        );
    }

    #[rstest]
    fn builders_set_client_only_flag() {
        let created = Poi::client_created(PoiClientId(1), "Cafe X").with_first_comment("great");
        assert!(created.client_only);
        assert_eq!(created.first_comment.as_deref(), Some("great"));

        let known = Poi::server_known(PoiClientId(2), "p-2", "Tower");
        assert!(!known.client_only);
        assert_eq!(known.server_id.as_deref(), Some("p-2"));
    }
}
