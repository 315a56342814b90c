//! Driven port for platform location services.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::define_port_error;
use crate::domain::LocationFix;

/// Accuracy/power trade-off requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocationPriority {
    /// GPS-grade fixes.
    #[default]
    HighAccuracy,
    /// Network-grade fixes.
    Balanced,
}

/// Periodic update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRequestSettings {
    /// Preferred interval between fixes.
    pub interval: Duration,
    /// Fastest interval the bridge can absorb.
    pub fastest_interval: Duration,
    /// Requested priority.
    pub priority: LocationPriority,
}

impl Default for LocationRequestSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5_000),
            fastest_interval: Duration::from_millis(1_000),
            priority: LocationPriority::HighAccuracy,
        }
    }
}

/// Item delivered on an update stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationUpdate {
    /// A new fix.
    Fix(LocationFix),
    /// The platform connection was suspended; the stream ends after this.
    ConnectionSuspended,
}

define_port_error! {
    /// Errors raised by the platform location service.
    pub enum LocationSourceError {
        /// Connecting to the service failed.
        Connect { message: String } =>
            "location service connect failed: {message}",
        /// The service is unavailable or the provider is disabled.
        Unavailable { message: String } =>
            "location service unavailable: {message}",
    }
}

/// Port for platform location services.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Connect to the platform service.
    async fn connect(&self) -> Result<(), LocationSourceError>;

    /// Last fix known to the platform, if any.
    async fn last_known_location(&self) -> Result<Option<LocationFix>, LocationSourceError>;

    /// Subscribe to periodic updates.
    ///
    /// The returned channel closes when the platform drops the subscription.
    async fn request_updates(
        &self,
        settings: LocationRequestSettings,
    ) -> Result<mpsc::UnboundedReceiver<LocationUpdate>, LocationSourceError>;

    /// Cancel periodic updates.
    async fn remove_updates(&self);

    /// Whether the GPS provider is enabled.
    fn is_provider_enabled(&self) -> Result<bool, LocationSourceError>;
}

/// Fixture implementation that connects but never produces a fix.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureLocationSource;

#[async_trait]
impl LocationSource for FixtureLocationSource {
    async fn connect(&self) -> Result<(), LocationSourceError> {
        Ok(())
    }

    async fn last_known_location(&self) -> Result<Option<LocationFix>, LocationSourceError> {
        Ok(None)
    }

    async fn request_updates(
        &self,
        _settings: LocationRequestSettings,
    ) -> Result<mpsc::UnboundedReceiver<LocationUpdate>, LocationSourceError> {
        let (_sender, receiver) = mpsc::unbounded_channel();
        Ok(receiver)
    }

    async fn remove_updates(&self) {}

    fn is_provider_enabled(&self) -> Result<bool, LocationSourceError> {
        Ok(false)
    }
}
