//! File descriptors exchanged with the upload middleware
//!
//! An [`IncomingFile`] is what the middleware hands to the engine for each
//! uploaded file; a [`StoredFile`] is what the engine hands back once the
//! bytes are on S3.

use std::collections::HashMap;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::{HeaderMap, Uri};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// The byte stream of one uploaded file.
///
/// Chunks arrive as the multipart parser produces them; the backend
/// consumes them incrementally, so backpressure flows from the S3 client
/// back to the request body.
pub type FileStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Request-scoped context passed to per-file option resolvers.
///
/// Hosts build one per request (see [`From<&http::request::Parts>`]) so
/// resolvers can derive buckets, keys or metadata from request headers or
/// the request target.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
    uri: Uri,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }
}

impl From<&http::request::Parts> for RequestContext {
    fn from(parts: &http::request::Parts) -> Self {
        Self {
            headers: parts.headers.clone(),
            uri: parts.uri.clone(),
        }
    }
}

/// Metadata of one uploaded file, as declared by the client.
///
/// This is the read-only view option resolvers receive; the byte stream
/// travels separately in [`IncomingFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Multipart field name.
    pub field_name: String,
    /// Original filename from the part headers.
    pub file_name: String,
    /// Content type declared by the client part, if any. Auto content-type
    /// detection ignores this and goes by the filename extension.
    pub content_type: Option<String>,
    /// Content-transfer-encoding of the part, if declared.
    pub encoding: Option<String>,
}

/// One uploaded file on its way to storage: metadata plus the byte stream.
pub struct IncomingFile {
    pub info: FileInfo,
    pub stream: FileStream,
}

impl IncomingFile {
    /// Build an incoming file from any async reader, e.g. a `tokio::fs::File`.
    pub fn from_reader<R>(info: FileInfo, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            info,
            stream: Box::pin(ReaderStream::new(reader)),
        }
    }
}

impl std::fmt::Debug for IncomingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingFile")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// The result descriptor for one stored file.
///
/// Combines the client-declared metadata with the parameters the engine
/// resolved and the fields the backend reported. Optional fields are absent
/// (not empty) when they were neither configured nor returned, and are
/// skipped during serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub field_name: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// The content type actually sent to the backend.
    pub content_type: String,
    /// Bytes transferred, as accounted by the backend.
    pub size: u64,
    pub bucket: String,
    pub key: String,
    pub acl: String,
    /// URL of the stored object.
    pub location: String,
    /// Backend-assigned content fingerprint.
    pub etag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_side_encryption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}
