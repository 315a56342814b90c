//! Mapping helpers between snapshots, backend payloads, and poll timing.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::ports::PutRequest;
use crate::domain::{RecognitionEvent, Snapshot};

/// Build the put payload for one snapshot.
///
/// The POI list carries the snapshot POI only while it is client-only.
pub(super) fn put_request(snapshot: &Snapshot, device_id: &str) -> PutRequest {
    let pois = snapshot
        .poi
        .iter()
        .filter(|poi| poi.client_only)
        .cloned()
        .collect();
    PutRequest {
        pois,
        recognition_events: vec![RecognitionEvent::from_snapshot(snapshot, device_id)],
    }
}

/// Whether sleeping `delay` more keeps the request within `ceiling`,
/// measured from `started_at`.
pub(super) fn within_ceiling(
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    delay: Duration,
    ceiling: Duration,
) -> bool {
    let elapsed = (now - started_at).to_std().unwrap_or(Duration::ZERO);
    elapsed.saturating_add(delay) <= ceiling
}

/// Seconds elapsed between two instants, floored at zero.
pub(super) fn elapsed_secs(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).max(TimeDelta::zero()).num_seconds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Poi, PoiClientId, SnapshotId};
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, seconds)
            .single()
            .expect("valid time")
    }

    fn snapshot(poi: Option<Poi>) -> Snapshot {
        Snapshot {
            id: SnapshotId(1),
            image_file_name: "s1.jpg".to_owned(),
            poi,
            votes: Vec::new(),
            captured_at: at(0),
        }
    }

    #[rstest]
    #[case(Some(Poi::client_created(PoiClientId(1), "Cafe X")), 1)]
    #[case(Some(Poi::server_known(PoiClientId(2), "p-2", "Tower")), 0)]
    #[case(None, 0)]
    fn put_request_lists_only_client_only_pois(
        #[case] poi: Option<Poi>,
        #[case] expected_pois: usize,
    ) {
        let request = put_request(&snapshot(poi), "abcd1234");
        assert_eq!(request.pois.len(), expected_pois);
        assert_eq!(request.recognition_events.len(), 1);
        assert_eq!(request.recognition_events[0].device_id, "abcd1234");
    }

    #[rstest]
    #[case(0, 3, 300, true)]
    #[case(297, 3, 300, true)]
    #[case(298, 3, 300, false)]
    #[case(0, 301, 300, false)]
    fn ceiling_bounds_total_poll_time(
        #[case] elapsed: u32,
        #[case] delay: u64,
        #[case] ceiling: u64,
        #[case] expected: bool,
    ) {
        let started = at(0);
        let now = started + TimeDelta::seconds(i64::from(elapsed));
        assert_eq!(
            within_ceiling(
                started,
                now,
                Duration::from_secs(delay),
                Duration::from_secs(ceiling)
            ),
            expected
        );
    }

    #[rstest]
    fn clock_going_backwards_counts_as_zero_elapsed() {
        assert_eq!(elapsed_secs(at(10), at(0)), 0);
        assert!(within_ceiling(
            at(10),
            at(0),
            Duration::from_secs(5),
            Duration::from_secs(5)
        ));
    }
}
