//! Cache requests raised by the recognition engine.

use std::fmt;

use super::LocationFix;
use super::ports::PoiQuery;

/// Engine-assigned identifier of an outstanding cache request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub i32);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request to fetch POIs for the area around one fix.
///
/// Lives until exactly one terminal answer reaches the engine and is never
/// reused for another request.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRequest {
    /// Engine-assigned id, echoed back in the terminal answer.
    pub request_id: RequestId,
    /// Fix the engine asked about.
    pub fix: LocationFix,
    /// Country code sent to the backend.
    pub country_code: Option<String>,
    /// Reporting device id.
    pub device_id: String,
}

impl CacheRequest {
    /// Backend query for this request. Polls never force a refresh.
    pub fn query(&self) -> PoiQuery {
        PoiQuery {
            latitude: self.fix.latitude(),
            longitude: self.fix.longitude(),
            accuracy: self.fix.accuracy(),
            country_code: self.country_code.clone(),
            device_id: self.device_id.clone(),
            force_refresh: false,
        }
    }
}
