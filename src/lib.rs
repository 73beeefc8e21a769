//! S3 storage engine for multipart upload handling
//!
//! This crate plugs object storage into multipart upload handling: each
//! uploaded file's byte stream goes straight to S3 (or any S3-compatible
//! service) instead of local disk, and the caller gets back a descriptor
//! with the backend-assigned location, ETag and version id.
//!
//! Upload parameters (bucket, key, ACL, content type, encryption, user
//! metadata) are configured once as [`UploadOptions`]; any of them can be
//! a fixed value or a per-file resolver. The engine itself keeps no
//! per-upload state, so one instance serves every file of every concurrent
//! request.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use multipart_s3::{
//!     AwsBackend, OptionValue, S3StorageEngine, UploadOptions, AUTO_CONTENT_TYPE,
//! };
//!
//! # async fn example() -> Result<(), multipart_s3::StorageError> {
//! let backend = Arc::new(AwsBackend::from_env().await);
//! let options = UploadOptions::builder()
//!     .bucket("user-uploads")
//!     .key(OptionValue::resolver(|_ctx, file| {
//!         let name = file.file_name.clone();
//!         async move { Ok(format!("media/{name}")) }
//!     }))
//!     .content_type(AUTO_CONTENT_TYPE)
//!     .build()?;
//! let engine = S3StorageEngine::new(backend, options);
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```
//!
//! Axum handlers wire the engine in through [`process_multipart`], which
//! streams file parts to storage as the request body is parsed.

pub mod backend;
pub mod engine;
pub mod error;
pub mod models;
pub mod multipart;
pub mod options;

#[cfg(feature = "test-utils")]
pub mod test_helpers;

pub use backend::aws::{AwsBackend, S3ClientConfig};
pub use backend::{S3Backend, UploadOutput, UploadRequest};
pub use engine::s3::S3StorageEngine;
pub use engine::StorageEngine;
pub use error::StorageError;
pub use models::{FileInfo, FileStream, IncomingFile, RequestContext, StoredFile};
pub use multipart::{process_multipart, UploadedForm};
pub use options::{
    ContentTypeOption, OptionValue, UploadOptions, UploadOptionsBuilder, AUTO_CONTENT_TYPE,
    DEFAULT_CONTENT_TYPE,
};
