//! Odie backend outbound adapters.
//!
//! This module provides a thin HTTP implementation of the `PoiBackend`
//! port and the factory the backend slot uses to build it.

mod dto;
mod http_backend;

pub use http_backend::{OdieBackendFactory, OdieHttpBackend};
