//! Upload options: static values and per-file resolvers
//!
//! Every parameter of an S3 upload can either be fixed for all files or
//! computed per file from the request context and the file metadata. The
//! [`OptionValue`] union models that choice; [`UploadOptions`] collects the
//! full parameter set and validates it once, at construction time. The
//! validated options are immutable and shared read-only across all
//! concurrent uploads.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption, StorageClass};
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::models::{FileInfo, RequestContext};

/// Content type used when nothing is configured and auto-detection finds
/// no match for the filename extension.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Sentinel instructing the engine to infer the content type from the
/// uploaded filename instead of using a fixed value.
pub const AUTO_CONTENT_TYPE: ContentTypeOption = ContentTypeOption::Auto;

type ResolverFn<T> =
    dyn Fn(&RequestContext, &FileInfo) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync;

/// A per-upload parameter: either one value for all files, or a resolver
/// invoked once per file.
///
/// Resolvers receive the request context and the file metadata and must
/// return an owned value; a resolver failure fails the whole per-file
/// operation.
#[derive(Clone)]
pub enum OptionValue<T> {
    Static(T),
    Resolver(Arc<ResolverFn<T>>),
}

impl<T: Clone> OptionValue<T> {
    /// Wrap a per-file resolver function.
    ///
    /// The closure must clone whatever it needs out of its arguments before
    /// entering the async block:
    ///
    /// ```ignore
    /// let key = OptionValue::resolver(|_ctx, file| {
    ///     let name = file.file_name.clone();
    ///     async move { Ok(format!("uploads/{name}")) }
    /// });
    /// ```
    pub fn resolver<F, Fut>(resolver: F) -> Self
    where
        F: Fn(&RequestContext, &FileInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        OptionValue::Resolver(Arc::new(move |ctx, file| Box::pin(resolver(ctx, file))))
    }

    /// Evaluate the option for one file: clone a static value, or await
    /// the resolver.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        file: &FileInfo,
    ) -> anyhow::Result<T> {
        match self {
            OptionValue::Static(value) => Ok(value.clone()),
            OptionValue::Resolver(resolver) => resolver(ctx, file).await,
        }
    }
}

impl<T> From<T> for OptionValue<T> {
    fn from(value: T) -> Self {
        OptionValue::Static(value)
    }
}

impl From<&str> for OptionValue<String> {
    fn from(value: &str) -> Self {
        OptionValue::Static(value.to_string())
    }
}

impl<T: fmt::Debug> fmt::Debug for OptionValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Static(value) => f.debug_tuple("Static").field(value).finish(),
            OptionValue::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// How the engine determines the `Content-Type` sent to the backend.
#[derive(Clone, Default)]
pub enum ContentTypeOption {
    /// Always send [`DEFAULT_CONTENT_TYPE`].
    #[default]
    Default,
    /// Infer from the filename extension; unrecognized extensions fall back
    /// to [`DEFAULT_CONTENT_TYPE`] and mark the object as an attachment.
    Auto,
    /// One content type for all files.
    Static(String),
    /// Per-file resolver.
    Resolver(Arc<ResolverFn<String>>),
}

impl ContentTypeOption {
    /// Wrap a per-file content-type resolver.
    pub fn resolver<F, Fut>(resolver: F) -> Self
    where
        F: Fn(&RequestContext, &FileInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        ContentTypeOption::Resolver(Arc::new(move |ctx, file| Box::pin(resolver(ctx, file))))
    }
}

impl From<&str> for ContentTypeOption {
    fn from(value: &str) -> Self {
        ContentTypeOption::Static(value.to_string())
    }
}

impl From<String> for ContentTypeOption {
    fn from(value: String) -> Self {
        ContentTypeOption::Static(value)
    }
}

impl fmt::Debug for ContentTypeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentTypeOption::Default => f.write_str("Default"),
            ContentTypeOption::Auto => f.write_str("Auto"),
            ContentTypeOption::Static(value) => f.debug_tuple("Static").field(value).finish(),
            ContentTypeOption::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Look up a MIME type from the filename extension.
pub(crate) fn detect_content_type(file_name: &str) -> Option<&'static str> {
    mime_guess::from_path(file_name).first_raw()
}

/// The full, validated upload parameter set.
///
/// Built through [`UploadOptions::builder`]; validation happens once in
/// [`UploadOptionsBuilder::build`] and the result never changes afterwards.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub(crate) bucket: OptionValue<String>,
    pub(crate) key: OptionValue<String>,
    pub(crate) acl: Option<OptionValue<ObjectCannedAcl>>,
    pub(crate) content_type: ContentTypeOption,
    pub(crate) content_disposition: Option<OptionValue<String>>,
    pub(crate) cache_control: Option<OptionValue<String>>,
    pub(crate) storage_class: Option<OptionValue<StorageClass>>,
    pub(crate) server_side_encryption: Option<OptionValue<ServerSideEncryption>>,
    pub(crate) sse_kms_key_id: Option<OptionValue<String>>,
    pub(crate) metadata: Option<OptionValue<HashMap<String, String>>>,
    pub(crate) extra_params: Option<OptionValue<HashMap<String, String>>>,
}

impl UploadOptions {
    pub fn builder() -> UploadOptionsBuilder {
        UploadOptionsBuilder::default()
    }
}

/// Builder for [`UploadOptions`]. `bucket` and `key` are mandatory.
#[derive(Debug, Default)]
pub struct UploadOptionsBuilder {
    bucket: Option<OptionValue<String>>,
    key: Option<OptionValue<String>>,
    acl: Option<OptionValue<ObjectCannedAcl>>,
    content_type: ContentTypeOption,
    content_disposition: Option<OptionValue<String>>,
    cache_control: Option<OptionValue<String>>,
    storage_class: Option<OptionValue<StorageClass>>,
    server_side_encryption: Option<OptionValue<ServerSideEncryption>>,
    sse_kms_key_id: Option<OptionValue<String>>,
    metadata: Option<OptionValue<HashMap<String, String>>>,
    extra_params: Option<OptionValue<HashMap<String, String>>>,
}

impl UploadOptionsBuilder {
    /// Target bucket: a fixed name or a per-file resolver. Required.
    pub fn bucket(mut self, bucket: impl Into<OptionValue<String>>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Object key: a fixed string or a per-file resolver. Required.
    pub fn key(mut self, key: impl Into<OptionValue<String>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Canned ACL applied to each object. Defaults to `private`.
    pub fn acl(mut self, acl: impl Into<OptionValue<ObjectCannedAcl>>) -> Self {
        self.acl = Some(acl.into());
        self
    }

    /// Content-type strategy. Defaults to [`DEFAULT_CONTENT_TYPE`]; pass
    /// [`AUTO_CONTENT_TYPE`] for extension-based detection.
    pub fn content_type(mut self, content_type: impl Into<ContentTypeOption>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn content_disposition(
        mut self,
        content_disposition: impl Into<OptionValue<String>>,
    ) -> Self {
        self.content_disposition = Some(content_disposition.into());
        self
    }

    pub fn cache_control(mut self, cache_control: impl Into<OptionValue<String>>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    pub fn storage_class(mut self, storage_class: impl Into<OptionValue<StorageClass>>) -> Self {
        self.storage_class = Some(storage_class.into());
        self
    }

    pub fn server_side_encryption(
        mut self,
        server_side_encryption: impl Into<OptionValue<ServerSideEncryption>>,
    ) -> Self {
        self.server_side_encryption = Some(server_side_encryption.into());
        self
    }

    pub fn sse_kms_key_id(mut self, sse_kms_key_id: impl Into<OptionValue<String>>) -> Self {
        self.sse_kms_key_id = Some(sse_kms_key_id.into());
        self
    }

    /// User metadata attached to each object. Empty maps are not sent.
    pub fn metadata(mut self, metadata: impl Into<OptionValue<HashMap<String, String>>>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Additional backend parameters merged into each upload request.
    ///
    /// Only parameters the engine does not already control are accepted;
    /// `Bucket`, `Key` and `Body` are rejected when the map is resolved.
    pub fn extra_params(
        mut self,
        extra_params: impl Into<OptionValue<HashMap<String, String>>>,
    ) -> Self {
        self.extra_params = Some(extra_params.into());
        self
    }

    /// Validate and freeze the options.
    pub fn build(self) -> Result<UploadOptions, StorageError> {
        let bucket = self
            .bucket
            .ok_or_else(|| StorageError::InvalidOptions("The bucket option is required".into()))?;
        if matches!(&bucket, OptionValue::Static(name) if name.is_empty()) {
            return Err(StorageError::InvalidOptions(
                "The bucket option must not be empty".into(),
            ));
        }

        let key = self
            .key
            .ok_or_else(|| StorageError::InvalidOptions("The key option is required".into()))?;
        if matches!(&key, OptionValue::Static(name) if name.is_empty()) {
            return Err(StorageError::InvalidOptions(
                "The key option must not be empty".into(),
            ));
        }

        if let ContentTypeOption::Static(value) = &self.content_type {
            if value.is_empty() {
                return Err(StorageError::InvalidOptions(
                    "The content_type option must not be empty".into(),
                ));
            }
        }

        Ok(UploadOptions {
            bucket,
            key,
            acl: self.acl,
            content_type: self.content_type,
            content_disposition: self.content_disposition,
            cache_control: self.cache_control,
            storage_class: self.storage_class,
            server_side_encryption: self.server_side_encryption,
            sse_kms_key_id: self.sse_kms_key_id,
            metadata: self.metadata,
            extra_params: self.extra_params,
        })
    }
}
