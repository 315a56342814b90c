//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Each driven adapter (backend HTTP client, object storage, image
//! directory, platform location services, recognition engine) is reached
//! through a trait defined here. Error enums are generated by
//! `define_port_error!` so adapters map their failures into predictable
//! variants.

mod macros;
pub(crate) use macros::define_port_error;

mod blob_sink;
mod image_store;
mod location_source;
mod poi_backend;
mod recognition_engine;

#[cfg(test)]
pub use blob_sink::MockBlobSink;
pub use blob_sink::{BlobSink, BlobSinkError, FixtureBlobSink, UploadTarget};
#[cfg(test)]
pub use image_store::MockImageStore;
pub use image_store::{ImageLease, ImageStore, ImageStoreError};
#[cfg(test)]
pub use location_source::MockLocationSource;
pub use location_source::{
    FixtureLocationSource, LocationPriority, LocationRequestSettings, LocationSource,
    LocationSourceError, LocationUpdate,
};
#[cfg(test)]
pub use poi_backend::MockPoiBackend;
pub use poi_backend::{
    FixturePoiBackend, PoiBackend, PoiBackendError, PoiCreation, PoiListing, PoiQuery,
    PutRequest, PutResponse,
};
#[cfg(test)]
pub use recognition_engine::MockRecognitionEngine;
pub use recognition_engine::{
    EngineDiagnostic, EngineEvents, RecognitionEngine, RecognitionEngineError,
};
