//! Reqwest-backed Odie backend adapter.
//!
//! This adapter owns transport details only: request serialisation, the API
//! key header, timeout and HTTP error mapping, and JSON decoding into domain
//! records.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::dto::{PoiListingDto, PutRequestDto, PutResponseDto};
use crate::outbound::body_preview;
use crate::domain::ports::{
    PoiBackend, PoiBackendError, PoiListing, PoiQuery, PutRequest, PutResponse,
};
use crate::domain::{BackendConfig, PoiBackendFactory};

const API_KEY_HEADER: &str = "X-Api-Key";
const DEFAULT_USER_AGENT: &str = "urbo-sync/0.1";

/// Odie backend adapter talking to one endpoint.
pub struct OdieHttpBackend {
    client: Client,
    pois_url: Url,
    api_key: String,
}

impl OdieHttpBackend {
    /// Build an adapter with an explicit request timeout.
    /// ```rust,ignore
    /// let backend = OdieHttpBackend::new(&config, Duration::from_secs(30))?;
    /// ```
    /// # Errors
    ///
    /// Returns [`PoiBackendError::Rejected`] when the endpoint cannot carry a
    /// path and [`PoiBackendError::Transport`] when the reqwest client cannot
    /// be constructed.
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self, PoiBackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|err| PoiBackendError::transport(err.to_string()))?;
        Ok(Self {
            client,
            pois_url: pois_url(&config.endpoint)?,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl PoiBackend for OdieHttpBackend {
    async fn get_pois(&self, query: &PoiQuery) -> Result<PoiListing, PoiBackendError> {
        let response = self
            .client
            .get(self.pois_url.clone())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query_params(query))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        debug!(bytes = body.len(), "GET /pois answered");
        parse_listing(body.as_ref())
    }

    async fn put(&self, request: &PutRequest) -> Result<PutResponse, PoiBackendError> {
        let response = self
            .client
            .put(self.pois_url.clone())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&PutRequestDto::from_domain(request))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        debug!(bytes = body.len(), "PUT /pois answered");
        parse_put_response(body.as_ref())
    }
}

/// Builds [`OdieHttpBackend`] instances for the backend slot.
#[derive(Debug, Clone, Copy)]
pub struct OdieBackendFactory {
    timeout: Duration,
}

impl OdieBackendFactory {
    /// Factory whose backends use `timeout` per request.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl PoiBackendFactory for OdieBackendFactory {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn PoiBackend>, PoiBackendError> {
        Ok(Arc::new(OdieHttpBackend::new(config, self.timeout)?))
    }
}

fn pois_url(endpoint: &Url) -> Result<Url, PoiBackendError> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|()| PoiBackendError::rejected(format!("endpoint {endpoint} cannot carry a path")))?
        .pop_if_empty()
        .push("pois");
    Ok(url)
}

fn query_params(query: &PoiQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("lat", query.latitude.to_string()),
        ("lon", query.longitude.to_string()),
        ("accuracy", query.accuracy.to_string()),
    ];
    if let Some(country) = &query.country_code {
        params.push(("country", country.clone()));
    }
    params.push(("deviceId", query.device_id.clone()));
    params.push(("forceRefresh", query.force_refresh.to_string()));
    params
}

fn parse_listing(body: &[u8]) -> Result<PoiListing, PoiBackendError> {
    let decoded: PoiListingDto = serde_json::from_slice(body).map_err(|error| {
        PoiBackendError::decode(format!("invalid POI listing payload: {error}"))
    })?;
    decoded.into_domain().map_err(PoiBackendError::decode)
}

fn parse_put_response(body: &[u8]) -> Result<PutResponse, PoiBackendError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PutResponse::default());
    }
    let decoded: PutResponseDto = serde_json::from_slice(body).map_err(|error| {
        PoiBackendError::decode(format!("invalid put response payload: {error}"))
    })?;
    decoded.into_domain().map_err(PoiBackendError::decode)
}

fn map_transport_error(error: reqwest::Error) -> PoiBackendError {
    if error.is_timeout() {
        PoiBackendError::timeout(error.to_string())
    } else {
        PoiBackendError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> PoiBackendError {
    let body_preview = body_preview(body);
    let message = if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    };

    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            PoiBackendError::timeout(message)
        }
        _ if status.is_client_error() => PoiBackendError::rejected(message),
        _ => PoiBackendError::transport(message),
    }
}
