//! Object-storage outbound adapters.
//!
//! This module provides an HTTP implementation of the `BlobSink` port.

mod http_sink;

pub use http_sink::{DEFAULT_BUCKET_URL_TEMPLATE, HttpBlobSink};
