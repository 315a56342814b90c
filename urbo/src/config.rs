//! Urbo configuration loaded via OrthoConfig.
//!
//! Values layer defaults, configuration files, `URBO_*` environment
//! variables, and command-line arguments. Every field may be left unset:
//! numeric limits carry OrthoConfig defaults and the accessors resolve the
//! remaining optional values.

use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::ports::LocationRequestSettings;
use crate::domain::{
    LocationBridgeConfig, SyncSchedulerConfig, UrboOptions, device_id,
};

/// Production Odie endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://odie.fringefy.com/odie";
const DEFAULT_MAX_IMAGE_CACHE_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_MAX_BACKEND_CONNECTIONS: usize = 2;
const DEFAULT_LOCATION_UPDATE_INTERVAL_MS: u64 = 5_000;
const DEFAULT_LOCATION_FASTEST_INTERVAL_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_CEILING_SECS: u64 = 300;

fn default_image_dir() -> PathBuf {
    std::env::temp_dir().join("urbo-images")
}

/// Configuration values for the sync core and its adapters.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "URBO")]
pub struct UrboSettings {
    /// Odie backend endpoint.
    pub endpoint: Option<String>,
    /// Odie API key; required before any backend call.
    pub api_key: Option<String>,
    /// Directory holding snapshot images.
    pub image_dir: Option<PathBuf>,
    /// Byte budget of the image directory.
    #[ortho_config(default = 52428800)]
    pub max_image_cache_bytes: u64,
    /// Worker count of the sync scheduler.
    #[ortho_config(default = 2)]
    pub max_backend_connections: usize,
    /// Preferred interval between location fixes.
    #[ortho_config(default = 5000)]
    pub location_update_interval_ms: u64,
    /// Fastest interval between location fixes.
    #[ortho_config(default = 1000)]
    pub location_fastest_interval_ms: u64,
    /// Per-request HTTP timeout.
    #[ortho_config(default = 30)]
    pub request_timeout_secs: u64,
    /// Upper bound on the time one cache request may spend polling.
    #[ortho_config(default = 300)]
    pub poll_ceiling_secs: u64,
    /// ISO country code sent with cache requests.
    pub country_code: Option<String>,
    /// Hardware serial the device id is derived from.
    pub device_serial: Option<String>,
}

impl Default for UrboSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            image_dir: None,
            max_image_cache_bytes: DEFAULT_MAX_IMAGE_CACHE_BYTES,
            max_backend_connections: DEFAULT_MAX_BACKEND_CONNECTIONS,
            location_update_interval_ms: DEFAULT_LOCATION_UPDATE_INTERVAL_MS,
            location_fastest_interval_ms: DEFAULT_LOCATION_FASTEST_INTERVAL_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            poll_ceiling_secs: DEFAULT_POLL_CEILING_SECS,
            country_code: None,
            device_serial: None,
        }
    }
}

impl UrboSettings {
    /// Configured endpoint, falling back to the production endpoint.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    /// Configured image directory, falling back to a temp-dir folder.
    pub fn image_dir(&self) -> PathBuf {
        self.image_dir.clone().unwrap_or_else(default_image_dir)
    }

    /// Image directory byte budget.
    pub fn max_image_cache_bytes(&self) -> u64 {
        self.max_image_cache_bytes
    }

    /// Scheduler worker count; never below one.
    pub fn max_backend_connections(&self) -> usize {
        self.max_backend_connections.max(1)
    }

    /// Periodic location request.
    pub fn location_request(&self) -> LocationRequestSettings {
        LocationRequestSettings {
            interval: Duration::from_millis(self.location_update_interval_ms),
            fastest_interval: Duration::from_millis(self.location_fastest_interval_ms),
            ..LocationRequestSettings::default()
        }
    }

    /// HTTP timeout for backend and object-storage calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Poll ceiling for one cache request.
    pub fn poll_ceiling(&self) -> Duration {
        Duration::from_secs(self.poll_ceiling_secs)
    }

    /// Device id derived from the configured serial.
    pub fn device_id(&self) -> String {
        device_id(self.device_serial.as_deref())
    }

    /// Facade options for these settings.
    ///
    /// The endpoint always resolves (to the default when unset); the API key
    /// is passed through only when configured.
    pub fn urbo_options(&self) -> UrboOptions {
        UrboOptions {
            endpoint: Some(self.endpoint().to_owned()),
            api_key: self.api_key.clone(),
            scheduler: SyncSchedulerConfig {
                workers: self.max_backend_connections(),
                poll_ceiling: self.poll_ceiling(),
                country_code: self.country_code.clone(),
                device_id: self.device_id(),
                ..SyncSchedulerConfig::default()
            },
            location: LocationBridgeConfig {
                request: self.location_request(),
                ..LocationBridgeConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for configuration parsing and defaults.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 11] = [
        "URBO_ENDPOINT",
        "URBO_API_KEY",
        "URBO_IMAGE_DIR",
        "URBO_MAX_IMAGE_CACHE_BYTES",
        "URBO_MAX_BACKEND_CONNECTIONS",
        "URBO_LOCATION_UPDATE_INTERVAL_MS",
        "URBO_LOCATION_FASTEST_INTERVAL_MS",
        "URBO_REQUEST_TIMEOUT_SECS",
        "URBO_POLL_CEILING_SECS",
        "URBO_COUNTRY_CODE",
        "URBO_DEVICE_SERIAL",
    ];

    fn load_from_empty_args() -> UrboSettings {
        UrboSettings::load_from_iter([OsString::from("urbo")]).expect("config should load")
    }

    /// Every `URBO_*` variable, unset unless listed in `overrides`.
    fn env_with(overrides: &[(&'static str, &str)]) -> Vec<(&'static str, Option<String>)> {
        VARS.iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (*value).to_owned());
                (*name, value)
            })
            .collect()
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(env_with(&[]));

        let settings = load_from_empty_args();

        assert_eq!(settings.endpoint(), DEFAULT_ENDPOINT);
        assert!(settings.api_key.is_none());
        assert_eq!(settings.max_image_cache_bytes(), 50 * 1024 * 1024);
        assert_eq!(settings.max_backend_connections(), 2);
        assert_eq!(settings.location_request(), LocationRequestSettings::default());
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.poll_ceiling(), Duration::from_secs(300));
        assert_eq!(settings.image_dir(), default_image_dir());
    }

    #[rstest]
    fn loading_without_sources_matches_default_settings() {
        let _guard = lock_env(env_with(&[]));

        let loaded = UrboSettings::load_from_iter([OsString::from("urbo")])
            .expect("unset settings must still load");
        let defaults = UrboSettings::default();

        assert_eq!(loaded.max_image_cache_bytes, defaults.max_image_cache_bytes);
        assert_eq!(loaded.max_backend_connections, defaults.max_backend_connections);
        assert_eq!(loaded.request_timeout_secs, defaults.request_timeout_secs);
        assert_eq!(loaded.poll_ceiling_secs, defaults.poll_ceiling_secs);
        assert_eq!(loaded.location_request(), defaults.location_request());
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(env_with(&[
            ("URBO_ENDPOINT", "http://localhost:8080/odie"),
            ("URBO_API_KEY", "secret"),
            ("URBO_MAX_BACKEND_CONNECTIONS", "4"),
            ("URBO_LOCATION_UPDATE_INTERVAL_MS", "2000"),
            ("URBO_POLL_CEILING_SECS", "60"),
            ("URBO_COUNTRY_CODE", "GB"),
            ("URBO_DEVICE_SERIAL", "abc"),
        ]));

        let settings = load_from_empty_args();
        let options = settings.urbo_options();

        assert_eq!(options.endpoint.as_deref(), Some("http://localhost:8080/odie"));
        assert_eq!(options.api_key.as_deref(), Some("secret"));
        assert_eq!(options.scheduler.workers, 4);
        assert_eq!(options.scheduler.poll_ceiling, Duration::from_secs(60));
        assert_eq!(options.scheduler.country_code.as_deref(), Some("GB"));
        assert_eq!(options.scheduler.device_id, "ba7816bf");
        assert_eq!(options.location.request.interval, Duration::from_millis(2000));
        assert_eq!(
            options.location.request.fastest_interval,
            Duration::from_millis(1000)
        );
    }

    #[rstest]
    fn zero_connections_still_yield_one_worker() {
        let settings = UrboSettings {
            max_backend_connections: 0,
            ..UrboSettings::default()
        };

        assert_eq!(settings.max_backend_connections(), 1);
    }
}
