//! Snapshots, recognition states, and the recognition events built from them.

use std::fmt;

use chrono::{DateTime, Utc};

use super::poi::{Poi, PoiVote};

/// Engine-assigned snapshot identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(pub i64);

impl SnapshotId {
    /// Sentinel used in state notifications when no snapshot applies.
    pub const INVALID: Self = Self(-1);

    /// Return whether this id refers to an actual snapshot.
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recognition pipeline state ids reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognitionState {
    /// No frame processed yet.
    ColdStart,
    /// Looking for a match.
    Search,
    /// A POI is recognised.
    Recognition,
    /// Frames processed, nothing recognised.
    NoRecognition,
    /// The view cannot be indexed (sky, ground, blur).
    NonIndexable,
    /// The device is held at an unusable angle.
    BadOrientation,
    /// The device is moving too fast.
    Moving,
}

impl RecognitionState {
    /// Numeric state id as used by the engine.
    pub const fn id(self) -> i32 {
        match self {
            Self::ColdStart => -1,
            Self::Search => 0,
            Self::Recognition => 1,
            Self::NoRecognition => 2,
            Self::NonIndexable => 3,
            Self::BadOrientation => 4,
            Self::Moving => 5,
        }
    }

    /// Map an engine state id back to a state.
    ///
    /// ```
    /// use urbo::domain::RecognitionState;
    ///
    /// assert_eq!(RecognitionState::from_id(1), Some(RecognitionState::Recognition));
    /// assert_eq!(RecognitionState::from_id(42), None);
    /// ```
    pub const fn from_id(id: i32) -> Option<Self> {
        match id {
            -1 => Some(Self::ColdStart),
            0 => Some(Self::Search),
            1 => Some(Self::Recognition),
            2 => Some(Self::NoRecognition),
            3 => Some(Self::NonIndexable),
            4 => Some(Self::BadOrientation),
            5 => Some(Self::Moving),
            _ => None,
        }
    }
}

/// A captured camera frame plus the engine's recognition metadata.
///
/// The image itself lives in the image store under `image_file_name`; it is
/// removed once the recognition event is acknowledged or evicted by the
/// store's retention policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Unique snapshot id.
    pub id: SnapshotId,
    /// File name of the stored image.
    pub image_file_name: String,
    /// Associated POI, absent until recognised or tagged.
    pub poi: Option<Poi>,
    /// Candidate votes.
    pub votes: Vec<PoiVote>,
    /// Capture time on the device clock.
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Return whether the associated POI still needs creating on the backend.
    pub fn poi_needs_creation(&self) -> bool {
        self.poi.as_ref().is_some_and(|poi| poi.client_only)
    }
}

/// Recognition event record submitted to the backend for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionEvent {
    /// Snapshot the event describes.
    pub snapshot_id: SnapshotId,
    /// Uploaded image identifier (the stored file name).
    pub image_id: String,
    /// Associated POI, if any.
    pub poi: Option<Poi>,
    /// Candidate votes.
    pub votes: Vec<PoiVote>,
    /// Reporting device.
    pub device_id: String,
    /// Capture time on the device clock.
    pub captured_at: DateTime<Utc>,
}

impl RecognitionEvent {
    /// Build the event record for `snapshot`.
    pub fn from_snapshot(snapshot: &Snapshot, device_id: &str) -> Self {
        Self {
            snapshot_id: snapshot.id,
            image_id: snapshot.image_file_name.clone(),
            poi: snapshot.poi.clone(),
            votes: snapshot.votes.clone(),
            device_id: device_id.to_owned(),
            captured_at: snapshot.captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PoiClientId;
    use rstest::rstest;

    #[rstest]
    #[case(RecognitionState::ColdStart)]
    #[case(RecognitionState::Search)]
    #[case(RecognitionState::Recognition)]
    #[case(RecognitionState::NoRecognition)]
    #[case(RecognitionState::NonIndexable)]
    #[case(RecognitionState::BadOrientation)]
    #[case(RecognitionState::Moving)]
    fn state_ids_map_back(#[case] state: RecognitionState) {
        assert_eq!(RecognitionState::from_id(state.id()), Some(state));
    }

    #[rstest]
    fn invalid_snapshot_id_is_not_valid() {
        assert!(!SnapshotId::INVALID.is_valid());
        assert!(SnapshotId(0).is_valid());
    }

    #[rstest]
    fn poi_needs_creation_only_for_client_only_pois() {
        let mut snapshot = Snapshot {
            id: SnapshotId(1),
            image_file_name: "a.jpg".to_owned(),
            poi: None,
            votes: Vec::new(),
            captured_at: Utc::now(),
        };
        assert!(!snapshot.poi_needs_creation());

        snapshot.poi = Some(Poi::server_known(PoiClientId(1), "p-1", "Tower"));
        assert!(!snapshot.poi_needs_creation());

        snapshot.poi = Some(Poi::client_created(PoiClientId(2), "Cafe X"));
        assert!(snapshot.poi_needs_creation());
    }

    #[rstest]
    fn event_copies_snapshot_fields() {
        let snapshot = Snapshot {
            id: SnapshotId(9),
            image_file_name: "img-9.jpg".to_owned(),
            poi: Some(Poi::client_created(PoiClientId(4), "Kiosk")),
            votes: Vec::new(),
            captured_at: Utc::now(),
        };
        let event = RecognitionEvent::from_snapshot(&snapshot, "abcd1234");
        assert_eq!(event.snapshot_id, SnapshotId(9));
        assert_eq!(event.image_id, "img-9.jpg");
        assert_eq!(event.device_id, "abcd1234");
        assert_eq!(event.poi, snapshot.poi);
    }
}
