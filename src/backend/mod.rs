//! The object-storage contract the engine consumes
//!
//! The engine talks to S3 through the [`S3Backend`] trait so hosts and
//! tests can substitute their own client. [`aws::AwsBackend`] is the
//! production implementation over `aws-sdk-s3`.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption, StorageClass};

use crate::error::StorageError;
use crate::models::FileStream;

pub mod aws;

/// Parameter names the engine controls itself. Extra-parameter maps that
/// try to set one of these are rejected instead of silently overwritten.
pub const RESERVED_PARAMS: &[&str] = &["Bucket", "Key", "Body"];

/// Extra-parameter names the backend knows how to forward.
pub const SUPPORTED_EXTRA_PARAMS: &[&str] = &[
    "ContentEncoding",
    "ContentLanguage",
    "Tagging",
    "WebsiteRedirectLocation",
];

/// One streaming upload: the resolved parameters plus the byte stream.
pub struct UploadRequest {
    pub bucket: String,
    pub key: String,
    pub body: FileStream,
    pub acl: ObjectCannedAcl,
    pub content_type: String,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub storage_class: Option<StorageClass>,
    pub server_side_encryption: Option<ServerSideEncryption>,
    pub sse_kms_key_id: Option<String>,
    /// User metadata; `None` when nothing non-empty was resolved.
    pub metadata: Option<HashMap<String, String>>,
    /// Validated extra parameters, keyed by their S3 parameter name.
    pub extra_params: HashMap<String, String>,
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("acl", &self.acl)
            .field("content_type", &self.content_type)
            .field("storage_class", &self.storage_class)
            .field("server_side_encryption", &self.server_side_encryption)
            .finish_non_exhaustive()
    }
}

/// What the backend reports once the bytes are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutput {
    /// URL of the stored object.
    pub location: String,
    /// Content fingerprint assigned by the backend, without quotes.
    pub etag: String,
    /// Version id, when the bucket has versioning enabled.
    pub version_id: Option<String>,
    /// Bytes transferred, as counted while consuming the body.
    pub size: u64,
}

/// Storage backend consumed by the engine.
///
/// `upload` must consume the request body exactly once and report the
/// transferred byte count; `delete_object` removes a previously stored
/// object. Implementations own transport, authentication and any retry
/// policy; the engine adds none of its own.
#[async_trait]
pub trait S3Backend: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<UploadOutput, StorageError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}
