//! Driven port for the object storage that receives snapshot images.

use async_trait::async_trait;

use super::define_port_error;

/// Bucket and folder that snapshot images are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Bucket name.
    pub bucket: String,
    /// Folder (key prefix) inside the bucket.
    pub folder: String,
}

impl UploadTarget {
    /// Build a target.
    pub fn new(bucket: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            folder: folder.into(),
        }
    }

    /// Object key for `file_name` inside this target's folder.
    ///
    /// ```
    /// use urbo::domain::ports::UploadTarget;
    ///
    /// assert_eq!(UploadTarget::new("b", "f").object_key("a.jpg"), "f/a.jpg");
    /// assert_eq!(UploadTarget::new("b", "f/").object_key("a.jpg"), "f/a.jpg");
    /// assert_eq!(UploadTarget::new("b", "").object_key("a.jpg"), "a.jpg");
    /// ```
    pub fn object_key(&self, file_name: &str) -> String {
        let folder = self.folder.trim_matches('/');
        if folder.is_empty() {
            file_name.to_owned()
        } else {
            format!("{folder}/{file_name}")
        }
    }
}

define_port_error! {
    /// Errors surfaced while writing an object.
    pub enum BlobSinkError {
        /// Network transport failed before receiving a response.
        Transport { message: String } =>
            "blob transport failed: {message}",
        /// The storage service refused the object.
        Rejected { message: String } =>
            "blob upload rejected: {message}",
    }
}

/// Port for writing objects into a bucket.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobSink: Send + Sync {
    /// Store `body` under `key` in `target`'s bucket.
    async fn put_object(
        &self,
        target: &UploadTarget,
        key: &str,
        body: Vec<u8>,
    ) -> Result<(), BlobSinkError>;
}

/// Fixture implementation accepting every object.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureBlobSink;

#[async_trait]
impl BlobSink for FixtureBlobSink {
    async fn put_object(
        &self,
        _target: &UploadTarget,
        _key: &str,
        _body: Vec<u8>,
    ) -> Result<(), BlobSinkError> {
        Ok(())
    }
}
