//! Reqwest-backed object-storage sink.
//!
//! Objects are written with a plain HTTP `PUT` to a bucket URL built from a
//! template, `https://{bucket}.s3.amazonaws.com` by default.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::domain::ports::{BlobSink, BlobSinkError, UploadTarget};
use crate::outbound::body_preview;

/// Virtual-hosted S3 bucket URL.
pub const DEFAULT_BUCKET_URL_TEMPLATE: &str = "https://{bucket}.s3.amazonaws.com";
const BUCKET_PLACEHOLDER: &str = "{bucket}";
const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Blob sink writing JPEG objects over HTTP.
pub struct HttpBlobSink {
    client: Client,
    bucket_url_template: String,
}

impl HttpBlobSink {
    /// Build a sink for the default S3 bucket URL.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_template(DEFAULT_BUCKET_URL_TEMPLATE, timeout)
    }

    /// Build a sink for a custom bucket URL template containing `{bucket}`.
    /// ```rust,ignore
    /// let sink = HttpBlobSink::with_template("http://localhost:9000/{bucket}", timeout)?;
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn with_template(
        template: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            bucket_url_template: template.into(),
        })
    }
}

#[async_trait]
impl BlobSink for HttpBlobSink {
    async fn put_object(
        &self,
        target: &UploadTarget,
        key: &str,
        body: Vec<u8>,
    ) -> Result<(), BlobSinkError> {
        let url = object_url(&self.bucket_url_template, &target.bucket, key)?;
        let size = body.len();
        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, IMAGE_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|err| BlobSinkError::transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(map_status_error(status, body.as_ref()));
        }
        debug!(bucket = %target.bucket, key, size, "object stored");
        Ok(())
    }
}

fn object_url(template: &str, bucket: &str, key: &str) -> Result<Url, BlobSinkError> {
    validate_bucket(bucket)?;
    let base = template.replace(BUCKET_PLACEHOLDER, bucket);
    let mut url = Url::parse(&base)
        .map_err(|err| BlobSinkError::rejected(format!("invalid bucket url {base}: {err}")))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| BlobSinkError::rejected(format!("bucket url {base} cannot carry a path")))?;
        segments.pop_if_empty();
        for segment in key.split('/').filter(|segment| !segment.is_empty()) {
            segments.push(segment);
        }
    }
    Ok(url)
}

fn validate_bucket(bucket: &str) -> Result<(), BlobSinkError> {
    let valid = !bucket.is_empty()
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(BlobSinkError::rejected(format!("invalid bucket name {bucket:?}")))
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> BlobSinkError {
    let preview = body_preview(body);
    let message = if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), preview)
    };
    if status.is_client_error() {
        BlobSinkError::rejected(message)
    } else {
        BlobSinkError::transport(message)
    }
}
