//! S3 storage engine
//!
//! Resolves the configured upload parameters for each file, streams the
//! body to the backend in a single upload call, and merges the backend's
//! response with the file metadata. The engine holds no per-upload state;
//! any number of files can be in flight at once against the same instance.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption, StorageClass};
use tracing::debug;

use super::StorageEngine;
use crate::backend::{S3Backend, UploadRequest, RESERVED_PARAMS, SUPPORTED_EXTRA_PARAMS};
use crate::error::StorageError;
use crate::models::{FileInfo, IncomingFile, RequestContext, StoredFile};
use crate::options::{
    detect_content_type, ContentTypeOption, OptionValue, UploadOptions, DEFAULT_CONTENT_TYPE,
};

/// Storage engine streaming uploaded files to S3.
#[derive(Clone)]
pub struct S3StorageEngine {
    backend: Arc<dyn S3Backend>,
    options: UploadOptions,
}

impl S3StorageEngine {
    /// Create an engine from a backend and validated options.
    pub fn new(backend: Arc<dyn S3Backend>, options: UploadOptions) -> Self {
        Self { backend, options }
    }

    /// Evaluate every configured parameter for one file. The first resolver
    /// failure aborts the whole resolution.
    async fn resolve(
        &self,
        ctx: &RequestContext,
        info: &FileInfo,
    ) -> Result<ResolvedParams, StorageError> {
        let options = &self.options;

        let bucket = options
            .bucket
            .resolve(ctx, info)
            .await
            .map_err(StorageError::Resolve)?;
        let key = options
            .key
            .resolve(ctx, info)
            .await
            .map_err(StorageError::Resolve)?;

        let acl = match &options.acl {
            Some(acl) => acl.resolve(ctx, info).await.map_err(StorageError::Resolve)?,
            None => ObjectCannedAcl::Private,
        };

        let (content_type, fallback_attachment) = match &options.content_type {
            ContentTypeOption::Default => (DEFAULT_CONTENT_TYPE.to_string(), false),
            ContentTypeOption::Static(value) => (value.clone(), false),
            ContentTypeOption::Auto => match detect_content_type(&info.file_name) {
                Some(detected) => (detected.to_string(), false),
                None => (DEFAULT_CONTENT_TYPE.to_string(), true),
            },
            ContentTypeOption::Resolver(resolver) => (
                resolver(ctx, info).await.map_err(StorageError::Resolve)?,
                false,
            ),
        };

        // An undetected content type downloads as an attachment unless the
        // host configured a disposition of its own.
        let content_disposition = match &options.content_disposition {
            Some(disposition) => Some(
                disposition
                    .resolve(ctx, info)
                    .await
                    .map_err(StorageError::Resolve)?,
            ),
            None if fallback_attachment => Some("attachment".to_string()),
            None => None,
        };

        let cache_control = resolve_optional(&options.cache_control, ctx, info).await?;
        let storage_class = resolve_optional(&options.storage_class, ctx, info).await?;
        let server_side_encryption =
            resolve_optional(&options.server_side_encryption, ctx, info).await?;
        let sse_kms_key_id = resolve_optional(&options.sse_kms_key_id, ctx, info).await?;

        let metadata = resolve_optional(&options.metadata, ctx, info)
            .await?
            .filter(|metadata| !metadata.is_empty());

        let extra_params = resolve_optional(&options.extra_params, ctx, info)
            .await?
            .unwrap_or_default();
        validate_extra_params(&extra_params)?;

        Ok(ResolvedParams {
            bucket,
            key,
            acl,
            content_type,
            content_disposition,
            cache_control,
            storage_class,
            server_side_encryption,
            sse_kms_key_id,
            metadata,
            extra_params,
        })
    }
}

#[async_trait]
impl StorageEngine for S3StorageEngine {
    async fn handle_file(
        &self,
        ctx: &RequestContext,
        file: IncomingFile,
    ) -> Result<StoredFile, StorageError> {
        let IncomingFile { info, stream } = file;
        let params = self.resolve(ctx, &info).await?;

        debug!(
            "Uploading {} to s3://{}/{}",
            info.file_name, params.bucket, params.key
        );

        let request = UploadRequest {
            bucket: params.bucket.clone(),
            key: params.key.clone(),
            body: stream,
            acl: params.acl.clone(),
            content_type: params.content_type.clone(),
            content_disposition: params.content_disposition.clone(),
            cache_control: params.cache_control.clone(),
            storage_class: params.storage_class.clone(),
            server_side_encryption: params.server_side_encryption.clone(),
            sse_kms_key_id: params.sse_kms_key_id.clone(),
            metadata: params.metadata.clone(),
            extra_params: params.extra_params,
        };

        let output = self.backend.upload(request).await?;

        Ok(StoredFile {
            field_name: info.field_name,
            file_name: info.file_name,
            encoding: info.encoding,
            content_type: params.content_type,
            size: output.size,
            bucket: params.bucket,
            key: params.key,
            acl: params.acl.as_str().to_string(),
            location: output.location,
            etag: output.etag,
            content_disposition: params.content_disposition,
            cache_control: params.cache_control,
            storage_class: params.storage_class.map(|class| class.as_str().to_string()),
            server_side_encryption: params
                .server_side_encryption
                .map(|sse| sse.as_str().to_string()),
            version_id: output.version_id,
            metadata: params.metadata,
        })
    }

    async fn remove_file(
        &self,
        _ctx: &RequestContext,
        file: &StoredFile,
    ) -> Result<(), StorageError> {
        self.backend.delete_object(&file.bucket, &file.key).await
    }
}

#[derive(Debug)]
struct ResolvedParams {
    bucket: String,
    key: String,
    acl: ObjectCannedAcl,
    content_type: String,
    content_disposition: Option<String>,
    cache_control: Option<String>,
    storage_class: Option<StorageClass>,
    server_side_encryption: Option<ServerSideEncryption>,
    sse_kms_key_id: Option<String>,
    metadata: Option<HashMap<String, String>>,
    extra_params: HashMap<String, String>,
}

async fn resolve_optional<T: Clone>(
    value: &Option<OptionValue<T>>,
    ctx: &RequestContext,
    info: &FileInfo,
) -> Result<Option<T>, StorageError> {
    match value {
        Some(value) => Ok(Some(
            value.resolve(ctx, info).await.map_err(StorageError::Resolve)?,
        )),
        None => Ok(None),
    }
}

fn validate_extra_params(params: &HashMap<String, String>) -> Result<(), StorageError> {
    for name in params.keys() {
        if RESERVED_PARAMS.contains(&name.as_str()) {
            return Err(StorageError::InvalidOptions(format!(
                "The extra parameter {} is managed by the storage engine",
                name
            )));
        }
        if !SUPPORTED_EXTRA_PARAMS.contains(&name.as_str()) {
            return Err(StorageError::InvalidOptions(format!(
                "Unsupported extra parameter: {}",
                name
            )));
        }
    }
    Ok(())
}
