//! Driven port for the remote POI backend.
//!
//! The domain owns the request and response shapes so the scheduler stays
//! adapter-agnostic; the HTTP adapter only translates them to the wire.

use async_trait::async_trait;

use super::blob_sink::UploadTarget;
use super::define_port_error;
use crate::domain::{Poi, PoiClientId, RecognitionEvent};

/// Area query for one cache refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct PoiQuery {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Horizontal accuracy radius in metres.
    pub accuracy: f32,
    /// ISO country code, when known.
    pub country_code: Option<String>,
    /// Reporting device identifier.
    pub device_id: String,
    /// Ask the backend to bypass its own caches.
    pub force_refresh: bool,
}

/// POI listing returned for an area.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoiListing {
    /// POIs for the area; may be partial while `hit_me_again_in > 0`.
    pub pois: Vec<Poi>,
    /// Server-directed delay in seconds before polling the same request
    /// again. Zero marks the listing as final.
    pub hit_me_again_in: u64,
    /// Object-storage destination for snapshot images.
    pub upload_target: Option<UploadTarget>,
}

/// Batch submission of new POIs and recognition events.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PutRequest {
    /// POIs to create; only client-only POIs belong here.
    pub pois: Vec<Poi>,
    /// Recognition events to record.
    pub recognition_events: Vec<RecognitionEvent>,
}

/// Backend identifier assigned to a POI created from this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoiCreation {
    /// Local identifier sent in the request.
    pub client_id: PoiClientId,
    /// Identifier assigned by the backend.
    pub server_id: String,
}

/// Acknowledgement for a [`PutRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PutResponse {
    /// POIs the backend created, keyed by their client id.
    pub created: Vec<PoiCreation>,
    /// Authoritative POI records echoed back by the backend.
    pub pois: Vec<Poi>,
}

define_port_error! {
    /// Errors surfaced while calling the POI backend.
    pub enum PoiBackendError {
        /// Network transport failed before receiving a response.
        Transport { message: String } =>
            "backend transport failed: {message}",
        /// The call exceeded its timeout.
        Timeout { message: String } =>
            "backend timeout: {message}",
        /// The response could not be decoded.
        Decode { message: String } =>
            "backend response decode failed: {message}",
        /// The backend rejected the request.
        Rejected { message: String } =>
            "backend rejected request: {message}",
    }
}

/// Port for the POI backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PoiBackend: Send + Sync {
    /// Fetch POIs near a location.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use urbo::domain::ports::{FixturePoiBackend, PoiBackend, PoiQuery};
    ///
    /// let listing = FixturePoiBackend
    ///     .get_pois(&PoiQuery {
    ///         latitude: 40.0,
    ///         longitude: -73.0,
    ///         accuracy: 5.0,
    ///         country_code: None,
    ///         device_id: "abcd1234".to_owned(),
    ///         force_refresh: false,
    ///     })
    ///     .await?;
    /// assert_eq!(listing.hit_me_again_in, 0);
    /// # Ok::<(), urbo::domain::ports::PoiBackendError>(())
    /// ```
    async fn get_pois(&self, query: &PoiQuery) -> Result<PoiListing, PoiBackendError>;

    /// Submit new POIs and recognition events.
    async fn put(&self, request: &PutRequest) -> Result<PutResponse, PoiBackendError>;
}

/// Fixture implementation returning empty, final responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixturePoiBackend;

#[async_trait]
impl PoiBackend for FixturePoiBackend {
    async fn get_pois(&self, _query: &PoiQuery) -> Result<PoiListing, PoiBackendError> {
        Ok(PoiListing::default())
    }

    async fn put(&self, _request: &PutRequest) -> Result<PutResponse, PoiBackendError> {
        Ok(PutResponse::default())
    }
}
