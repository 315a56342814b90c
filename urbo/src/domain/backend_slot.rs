//! Holder for the configured POI backend.
//!
//! Endpoint and API key arrive independently; the backend is built once
//! both are present. Any call before that fails fast with
//! [`ErrorCode::Configuration`](crate::domain::ErrorCode::Configuration).

use std::sync::{Arc, RwLock};

use tracing::{debug, info};
use url::Url;

use super::Error;
use super::ports::{PoiBackend, PoiBackendError};

/// Connection settings for building a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base endpoint, e.g. `https://odie.fringefy.com/odie`.
    pub endpoint: Url,
    /// API key sent with every request.
    pub api_key: String,
}

/// Builds a backend from connection settings.
#[cfg_attr(test, mockall::automock)]
pub trait PoiBackendFactory: Send + Sync {
    /// Build a backend for `config`.
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn PoiBackend>, PoiBackendError>;
}

/// Factory returning one pre-built backend regardless of settings.
#[derive(Clone)]
pub struct StaticBackendFactory(pub Arc<dyn PoiBackend>);

impl PoiBackendFactory for StaticBackendFactory {
    fn build(&self, _config: &BackendConfig) -> Result<Arc<dyn PoiBackend>, PoiBackendError> {
        Ok(Arc::clone(&self.0))
    }
}

#[derive(Default)]
struct SlotState {
    endpoint: Option<Url>,
    api_key: Option<String>,
    backend: Option<Arc<dyn PoiBackend>>,
}

/// Thread-safe holder for the active backend.
pub struct BackendSlot {
    factory: Arc<dyn PoiBackendFactory>,
    state: RwLock<SlotState>,
}

impl BackendSlot {
    /// Build an empty slot.
    pub fn new(factory: Arc<dyn PoiBackendFactory>) -> Self {
        Self {
            factory,
            state: RwLock::new(SlotState::default()),
        }
    }

    /// Set the backend endpoint. Returns whether the backend is now ready.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::InvalidRequest`](crate::domain::ErrorCode::InvalidRequest)
    /// when `endpoint` is not an absolute URL; transport errors when the
    /// backend cannot be built.
    pub fn set_endpoint(&self, endpoint: &str) -> Result<bool, Error> {
        let url = Url::parse(endpoint.trim())
            .map_err(|err| Error::invalid_request(format!("invalid endpoint {endpoint}: {err}")))?;
        self.update(|state| state.endpoint = Some(url))
    }

    /// Set the API key. Returns whether the backend is now ready.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::InvalidRequest`](crate::domain::ErrorCode::InvalidRequest)
    /// when the key is blank; transport errors when the backend cannot be
    /// built.
    pub fn set_api_key(&self, api_key: &str) -> Result<bool, Error> {
        let key = api_key.trim();
        if key.is_empty() {
            return Err(Error::invalid_request("api key must not be blank"));
        }
        let key = key.to_owned();
        self.update(|state| state.api_key = Some(key))
    }

    /// Whether both endpoint and API key are set.
    pub fn is_configured(&self) -> bool {
        self.state
            .read()
            .map(|state| state.backend.is_some())
            .unwrap_or(false)
    }

    /// The active backend.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::Configuration`](crate::domain::ErrorCode::Configuration)
    /// naming what is still missing.
    pub fn backend(&self) -> Result<Arc<dyn PoiBackend>, Error> {
        let state = self
            .state
            .read()
            .map_err(|_| Error::internal("backend slot lock poisoned"))?;
        if let Some(backend) = &state.backend {
            return Ok(Arc::clone(backend));
        }
        let missing = match (&state.endpoint, &state.api_key) {
            (None, None) => "endpoint and api key",
            (None, Some(_)) => "endpoint",
            _ => "api key",
        };
        Err(Error::configuration(format!(
            "backend {missing} not configured"
        )))
    }

    fn update(&self, apply: impl FnOnce(&mut SlotState)) -> Result<bool, Error> {
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::internal("backend slot lock poisoned"))?;
        apply(&mut state);
        let (Some(endpoint), Some(api_key)) = (&state.endpoint, &state.api_key) else {
            debug!("backend slot still incomplete");
            return Ok(false);
        };
        let config = BackendConfig {
            endpoint: endpoint.clone(),
            api_key: api_key.clone(),
        };
        let backend = self
            .factory
            .build(&config)
            .map_err(|err| Error::transport(err.to_string()))?;
        info!(endpoint = %config.endpoint, "backend configured");
        state.backend = Some(backend);
        Ok(true)
    }
}
