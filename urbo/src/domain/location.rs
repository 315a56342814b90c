//! Location fixes produced by platform location services.

use chrono::{DateTime, Utc};

/// Validation errors raised while constructing a [`LocationFix`].
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum LocationFixValidationError {
    /// Latitude outside `[-90, 90]` or not finite.
    #[error("latitude must be a finite value within [-90, 90], got {0}")]
    Latitude(f64),
    /// Longitude outside `[-180, 180]` or not finite.
    #[error("longitude must be a finite value within [-180, 180], got {0}")]
    Longitude(f64),
    /// Negative or non-finite horizontal accuracy.
    #[error("accuracy must be a finite, non-negative radius in metres, got {0}")]
    Accuracy(f32),
}

/// One location fix: WGS84 coordinates, horizontal accuracy, and capture time.
///
/// Fixes are immutable once created; the bridge, engine, and scheduler each
/// read their own copy.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use urbo::domain::LocationFix;
///
/// let fix = LocationFix::new(40.0, -73.0, 5.0, Utc::now()).expect("valid fix");
/// assert_eq!(fix.latitude(), 40.0);
/// assert!(LocationFix::new(91.0, 0.0, 5.0, Utc::now()).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    latitude: f64,
    longitude: f64,
    accuracy: f32,
    timestamp: DateTime<Utc>,
}

impl LocationFix {
    /// Validate and build a fix.
    ///
    /// # Errors
    ///
    /// Returns [`LocationFixValidationError`] when a coordinate is out of
    /// range or the accuracy radius is negative.
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy: f32,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, LocationFixValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(LocationFixValidationError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationFixValidationError::Longitude(longitude));
        }
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(LocationFixValidationError::Accuracy(accuracy));
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy,
            timestamp,
        })
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Horizontal accuracy radius in metres.
    pub fn accuracy(&self) -> f32 {
        self.accuracy
    }

    /// Time the fix was produced.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
