//! Urbo sync core library modules.
//!
//! The crate links a recognition engine to the Odie POI backend: it answers
//! the engine's cache requests with server-paced polling, uploads
//! recognition events with their snapshot images, bridges platform location
//! updates, and fans engine notifications out to UI listeners.

pub mod config;
pub mod domain;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::UrboSettings;
pub use domain::Urbo;
