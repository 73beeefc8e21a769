/*!
 * Test Helpers and Utilities
 *
 * This module provides a recording mock backend and multipart body
 * builders for exercising the storage engine without a real S3 endpoint.
 * Enabled through the `test-utils` feature; the crate's own test suite
 * depends on itself with that feature turned on.
 */

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::backend::{S3Backend, UploadOutput, UploadRequest};
use crate::error::StorageError;
use crate::models::{FileInfo, FileStream, IncomingFile};

/// Location reported by [`MockS3Backend`] for every upload.
pub const MOCK_LOCATION: &str = "mock-location";

/// ETag reported by [`MockS3Backend`] for every upload.
pub const MOCK_ETAG: &str = "mock-etag";

/// One upload as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub bucket: String,
    pub key: String,
    pub acl: String,
    pub content_type: String,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub storage_class: Option<String>,
    pub server_side_encryption: Option<String>,
    pub sse_kms_key_id: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
    pub extra_params: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// In-memory [`S3Backend`] that records every call and answers with
/// [`MOCK_LOCATION`] / [`MOCK_ETAG`], like a local stand-in for S3.
#[derive(Debug, Default)]
pub struct MockS3Backend {
    uploads: Mutex<Vec<RecordedUpload>>,
    deletes: Mutex<Vec<(String, String)>>,
    upload_failure: Option<String>,
    delete_failure: Option<String>,
}

impl MockS3Backend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose uploads all fail with the given message.
    pub fn failing_uploads(message: impl Into<String>) -> Self {
        Self {
            upload_failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// A mock whose deletes all fail with the given message.
    pub fn failing_deletes(message: impl Into<String>) -> Self {
        Self {
            delete_failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl S3Backend for MockS3Backend {
    async fn upload(&self, request: UploadRequest) -> Result<UploadOutput, StorageError> {
        if let Some(message) = &self.upload_failure {
            return Err(StorageError::Upload(message.clone()));
        }

        let UploadRequest {
            bucket,
            key,
            mut body,
            acl,
            content_type,
            content_disposition,
            cache_control,
            storage_class,
            server_side_encryption,
            sse_kms_key_id,
            metadata,
            extra_params,
        } = request;

        let mut bytes = Vec::new();
        while let Some(chunk) = body.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        let size = bytes.len() as u64;

        self.uploads.lock().unwrap().push(RecordedUpload {
            bucket,
            key,
            acl: acl.as_str().to_string(),
            content_type,
            content_disposition,
            cache_control,
            storage_class: storage_class.map(|class| class.as_str().to_string()),
            server_side_encryption: server_side_encryption.map(|sse| sse.as_str().to_string()),
            sse_kms_key_id,
            metadata,
            extra_params,
            body: bytes,
        });

        Ok(UploadOutput {
            location: MOCK_LOCATION.to_string(),
            etag: MOCK_ETAG.to_string(),
            version_id: None,
            size,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        if let Some(message) = &self.delete_failure {
            return Err(StorageError::Delete(message.clone()));
        }

        self.deletes
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string()));
        Ok(())
    }
}

/// A one-chunk file stream over the given bytes.
pub fn byte_stream(data: impl Into<Bytes>) -> FileStream {
    let chunks: Vec<io::Result<Bytes>> = vec![Ok(data.into())];
    Box::pin(futures::stream::iter(chunks))
}

/// A file stream that delivers the bytes in fixed-size chunks.
pub fn chunked_stream(data: &[u8], chunk_size: usize) -> FileStream {
    let chunks: Vec<io::Result<Bytes>> = data
        .chunks(chunk_size)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// A file stream that fails after the given message.
pub fn failing_stream(message: &str) -> FileStream {
    let chunks: Vec<io::Result<Bytes>> = vec![Err(io::Error::other(message.to_string()))];
    Box::pin(futures::stream::iter(chunks))
}

/// Build an [`IncomingFile`] the way upload middleware would.
pub fn incoming_file(field_name: &str, file_name: &str, data: &[u8]) -> IncomingFile {
    IncomingFile {
        info: FileInfo {
            field_name: field_name.to_string(),
            file_name: file_name.to_string(),
            content_type: None,
            encoding: None,
        },
        stream: byte_stream(Bytes::copy_from_slice(data)),
    }
}

/// Hand-rolled `multipart/form-data` body builder for end-to-end tests.
#[derive(Debug, Clone)]
pub struct TestForm {
    boundary: String,
    body: Vec<u8>,
}

impl TestForm {
    pub fn new() -> Self {
        Self {
            boundary: "------------------------multipart-s3-test".to_string(),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// The `Content-Type` header value for the built body.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Finish the body with the closing boundary.
    pub fn into_body(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.body
    }
}

impl Default for TestForm {
    fn default() -> Self {
        Self::new()
    }
}
