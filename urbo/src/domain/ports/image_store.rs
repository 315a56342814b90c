//! Driven port for the local snapshot image directory.

use std::fmt;

use super::define_port_error;

define_port_error! {
    /// Errors raised by image storage.
    pub enum ImageStoreError {
        /// Filesystem operation failed.
        Io { message: String } =>
            "image store i/o failed: {message}",
        /// No image with this name exists.
        NotFound { file_name: String } =>
            "image {file_name} not found",
        /// The name is not a plain file name inside the image directory.
        InvalidName { file_name: String } =>
            "invalid image file name: {file_name}",
    }
}

/// Pinned image read for upload.
///
/// While a lease is alive the store neither evicts nor removes the file.
/// Dropping the lease releases the pin.
pub struct ImageLease {
    file_name: String,
    bytes: Vec<u8>,
    _pin: Box<dyn Send + Sync>,
}

impl ImageLease {
    /// Build a lease; `pin` is dropped together with the lease.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>, pin: impl Send + Sync + 'static) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            _pin: Box::new(pin),
        }
    }

    /// Leased file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Image bytes captured when the lease was taken.
    pub fn read(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ImageLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLease")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Port for snapshot image storage.
#[cfg_attr(test, mockall::automock)]
pub trait ImageStore: Send + Sync {
    /// Fresh, unique file name for a new snapshot image.
    fn generate_file_name(&self) -> String;

    /// Durably write `bytes` under `file_name`, then apply retention.
    fn write(&self, file_name: &str, bytes: &[u8]) -> Result<(), ImageStoreError>;

    /// Pin and read `file_name` for upload.
    fn lease(&self, file_name: &str) -> Result<ImageLease, ImageStoreError>;

    /// Delete `file_name`.
    ///
    /// Returns `Ok(false)` when the file is leased or already gone.
    fn remove(&self, file_name: &str) -> Result<bool, ImageStoreError>;
}
