//! AWS S3 backend built on `aws-sdk-s3`
//!
//! Small bodies go out as a single `PutObject`; bodies that grow past
//! [`MULTIPART_THRESHOLD`] while streaming switch to an S3 multipart
//! upload with parts shipped as they fill, so memory stays bounded by the
//! part size. A failed multipart upload is aborted before the error is
//! returned.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, ObjectCannedAcl, ServerSideEncryption, StorageClass,
};
use aws_sdk_s3::Client;
use aws_types::region::Region;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{S3Backend, UploadOutput, UploadRequest};
use crate::error::StorageError;

/// Threshold for switching to multipart uploads (100MB)
const MULTIPART_THRESHOLD: usize = 100 * 1024 * 1024;

/// Multipart part size (16MB - AWS minimum is 5MB, larger parts perform better)
const PART_SIZE: usize = 16 * 1024 * 1024;

const DEFAULT_REGION: &str = "us-east-1";

/// Explicit client settings for [`AwsBackend::connect`].
///
/// Use this for S3-compatible services or when credentials come from the
/// host's own configuration; [`AwsBackend::from_env`] covers the standard
/// AWS credential chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3ClientConfig {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// Custom endpoint for S3-compatible services (e.g. MinIO).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

/// Production [`S3Backend`] over an `aws_sdk_s3::Client`.
#[derive(Debug, Clone)]
pub struct AwsBackend {
    client: Client,
    region: Option<String>,
    endpoint_url: Option<String>,
}

impl AwsBackend {
    /// Wrap an existing client. The region for object URL construction is
    /// taken from the client configuration.
    pub fn new(client: Client) -> Self {
        let region = client.config().region().map(|r| r.to_string());
        Self {
            client,
            region,
            endpoint_url: None,
        }
    }

    /// Record a custom endpoint so object URLs are built path-style
    /// (`{endpoint}/{bucket}/{key}`) instead of virtual-hosted-style.
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Build a client from explicit settings.
    pub async fn connect(config: S3ClientConfig) -> Result<Self, StorageError> {
        if config.access_key_id.is_empty() {
            return Err(StorageError::InvalidOptions(
                "Access key ID is required".into(),
            ));
        }
        if config.secret_access_key.is_empty() {
            return Err(StorageError::InvalidOptions(
                "Secret access key is required".into(),
            ));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            config.session_token.clone(),
            None,
            "multipart-s3",
        );

        let region = if config.region.is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            config.region.clone()
        };

        let mut builder = aws_sdk_s3::config::Builder::new()
            .region(Region::new(region.clone()))
            .credentials_provider(credentials)
            .behavior_version_latest();

        let endpoint_url = config.endpoint_url.filter(|endpoint| !endpoint.is_empty());
        if let Some(endpoint) = &endpoint_url {
            info!("Using custom S3 endpoint: {}", endpoint);
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region: Some(region),
            endpoint_url,
        })
    }

    /// Build a client from the ambient AWS configuration (environment,
    /// profile, instance metadata).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }

    /// Public URL of a stored object.
    fn object_url(&self, bucket: &str, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
            None => {
                let region = self.region.as_deref().unwrap_or(DEFAULT_REGION);
                format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
            }
        }
    }

    async fn begin_multipart(&self, params: &ObjectParams) -> Result<MultipartUpload, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&params.bucket)
            .key(&params.key)
            .acl(params.acl.clone())
            .content_type(&params.content_type)
            .set_content_disposition(params.content_disposition.clone())
            .set_cache_control(params.cache_control.clone())
            .set_storage_class(params.storage_class.clone())
            .set_server_side_encryption(params.server_side_encryption.clone())
            .set_ssekms_key_id(params.sse_kms_key_id.clone())
            .set_metadata(params.metadata.clone())
            .set_content_encoding(params.extra.content_encoding.clone())
            .set_content_language(params.extra.content_language.clone())
            .set_tagging(params.extra.tagging.clone())
            .set_website_redirect_location(params.extra.website_redirect_location.clone())
            .send()
            .await
            .map_err(|e| {
                error!(
                    "Failed to initiate multipart upload for {}/{}: {}",
                    params.bucket, params.key, e
                );
                StorageError::Upload(format!(
                    "Failed to initiate multipart upload for {}: {}",
                    params.key, e
                ))
            })?;

        let upload_id = output.upload_id().ok_or_else(|| {
            StorageError::Upload("Missing upload ID in multipart upload response".into())
        })?;

        info!(
            "Initiated multipart upload for {}/{}: {}",
            params.bucket, params.key, upload_id
        );

        Ok(MultipartUpload {
            client: self.client.clone(),
            bucket: params.bucket.clone(),
            key: params.key.clone(),
            upload_id: upload_id.to_string(),
            parts: Vec::new(),
        })
    }

    async fn put_object(
        &self,
        params: &ObjectParams,
        data: Vec<u8>,
    ) -> Result<(String, Option<String>), StorageError> {
        let output = self
            .client
            .put_object()
            .bucket(&params.bucket)
            .key(&params.key)
            .acl(params.acl.clone())
            .content_type(&params.content_type)
            .set_content_disposition(params.content_disposition.clone())
            .set_cache_control(params.cache_control.clone())
            .set_storage_class(params.storage_class.clone())
            .set_server_side_encryption(params.server_side_encryption.clone())
            .set_ssekms_key_id(params.sse_kms_key_id.clone())
            .set_metadata(params.metadata.clone())
            .set_content_encoding(params.extra.content_encoding.clone())
            .set_content_language(params.extra.content_language.clone())
            .set_tagging(params.extra.tagging.clone())
            .set_website_redirect_location(params.extra.website_redirect_location.clone())
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                error!(
                    "Failed to store object {}/{}: {}",
                    params.bucket, params.key, e
                );
                StorageError::Upload(format!("Failed to store object {}: {}", params.key, e))
            })?;

        let etag = output
            .e_tag()
            .map(|tag| tag.trim_matches('"').to_string())
            .ok_or_else(|| {
                StorageError::Upload(format!("Missing ETag in response for {}", params.key))
            })?;

        Ok((etag, output.version_id().map(str::to_string)))
    }
}

#[async_trait]
impl S3Backend for AwsBackend {
    async fn upload(&self, request: UploadRequest) -> Result<UploadOutput, StorageError> {
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

        let params = ObjectParams {
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
            extra: ExtraFields::from_params(&extra_params),
        };

        let start = Instant::now();
        let mut buffer: Vec<u8> = Vec::new();
        let mut multipart: Option<MultipartUpload> = None;
        let mut total: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    if let Some(upload) = &multipart {
                        upload.abort().await;
                    }
                    return Err(StorageError::Stream(e));
                }
            };

            total += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);

            if multipart.is_none() && buffer.len() > MULTIPART_THRESHOLD {
                info!(
                    "Using streaming multipart upload for large body: {}/{}",
                    params.bucket, params.key
                );
                multipart = Some(self.begin_multipart(&params).await?);
            }

            if let Some(upload) = multipart.as_mut() {
                while buffer.len() >= PART_SIZE {
                    let rest = buffer.split_off(PART_SIZE);
                    let part = std::mem::replace(&mut buffer, rest);
                    if let Err(e) = upload.upload_part(part).await {
                        upload.abort().await;
                        return Err(e);
                    }
                }
            }
        }

        let (location, etag, version_id) = match multipart {
            None => {
                let (etag, version_id) = self.put_object(&params, buffer).await?;
                (self.object_url(&params.bucket, &params.key), etag, version_id)
            }
            Some(mut upload) => {
                if !buffer.is_empty() {
                    let part = std::mem::take(&mut buffer);
                    if let Err(e) = upload.upload_part(part).await {
                        upload.abort().await;
                        return Err(e);
                    }
                }
                let (location, etag, version_id) = upload.complete().await?;
                (
                    location.unwrap_or_else(|| self.object_url(&params.bucket, &params.key)),
                    etag,
                    version_id,
                )
            }
        };

        info!(
            "Stored object to S3: {}/{} ({} bytes in {:.1}ms)",
            params.bucket,
            params.key,
            total,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(UploadOutput {
            location,
            etag,
            version_id,
            size: total,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        info!("Deleting object from S3: {}/{}", bucket, key);

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to delete object {}/{}: {}", bucket, key, e);
                StorageError::Delete(format!("Failed to delete object {}: {}", key, e))
            })?;

        debug!("Deleted object: {}/{}", bucket, key);
        Ok(())
    }
}

/// Resolved upload parameters without the body.
struct ObjectParams {
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
    extra: ExtraFields,
}

/// Extra parameters mapped onto their typed request fields.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ExtraFields {
    content_encoding: Option<String>,
    content_language: Option<String>,
    tagging: Option<String>,
    website_redirect_location: Option<String>,
}

impl ExtraFields {
    fn from_params(params: &HashMap<String, String>) -> Self {
        let mut fields = Self::default();
        for (name, value) in params {
            match name.as_str() {
                "ContentEncoding" => fields.content_encoding = Some(value.clone()),
                "ContentLanguage" => fields.content_language = Some(value.clone()),
                "Tagging" => fields.tagging = Some(value.clone()),
                "WebsiteRedirectLocation" => {
                    fields.website_redirect_location = Some(value.clone())
                }
                // The engine validates extra parameters before they reach
                // the backend; anything unknown here is skipped.
                other => warn!("Ignoring unsupported extra parameter: {}", other),
            }
        }
        fields
    }
}

/// In-flight multipart upload state.
struct MultipartUpload {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
}

impl MultipartUpload {
    async fn upload_part(&mut self, data: Vec<u8>) -> Result<(), StorageError> {
        let part_number = self.parts.len() as i32 + 1;
        debug!(
            "Uploading part {} for {}/{} ({} bytes)",
            part_number,
            self.bucket,
            self.key,
            data.len()
        );

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                StorageError::Upload(format!(
                    "Failed to upload part {} for {}: {}",
                    part_number, self.key, e
                ))
            })?;

        let etag = output.e_tag().ok_or_else(|| {
            StorageError::Upload(format!(
                "Missing ETag in upload part response for {}",
                self.key
            ))
        })?;

        self.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(etag)
                .build(),
        );

        Ok(())
    }

    async fn complete(self) -> Result<(Option<String>, String, Option<String>), StorageError> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(self.parts.clone()))
            .build();

        match self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(completed)
            .send()
            .await
        {
            Ok(output) => {
                let etag = output
                    .e_tag()
                    .map(|tag| tag.trim_matches('"').to_string())
                    .ok_or_else(|| {
                        StorageError::Upload(format!("Missing ETag in response for {}", self.key))
                    })?;
                Ok((
                    output.location().map(str::to_string),
                    etag,
                    output.version_id().map(str::to_string),
                ))
            }
            Err(e) => {
                let err = StorageError::Upload(format!(
                    "Failed to complete multipart upload for {}: {}",
                    self.key, e
                ));
                self.abort().await;
                Err(err)
            }
        }
    }

    async fn abort(&self) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
        {
            error!(
                "Failed to abort multipart upload for {}/{}: {}",
                self.bucket, self.key, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client(region: Option<&str>) -> Client {
        let mut builder = aws_sdk_s3::config::Builder::new().behavior_version_latest();
        if let Some(region) = region {
            builder = builder.region(Region::new(region.to_string()));
        }
        Client::from_conf(builder.build())
    }

    #[test]
    fn object_url_uses_virtual_hosted_style_for_aws() {
        let backend = AwsBackend::new(offline_client(Some("eu-west-1")));
        assert_eq!(
            backend.object_url("assets", "media/a.png"),
            "https://assets.s3.eu-west-1.amazonaws.com/media/a.png"
        );
    }

    #[test]
    fn object_url_defaults_region_when_unset() {
        let backend = AwsBackend::new(offline_client(None));
        assert_eq!(
            backend.object_url("assets", "a.png"),
            "https://assets.s3.us-east-1.amazonaws.com/a.png"
        );
    }

    #[test]
    fn object_url_uses_path_style_with_custom_endpoint() {
        let backend = AwsBackend::new(offline_client(None))
            .with_endpoint_url("http://localhost:9000/");
        assert_eq!(
            backend.object_url("assets", "a.png"),
            "http://localhost:9000/assets/a.png"
        );
    }

    #[test]
    fn extra_fields_map_known_parameter_names() {
        let mut params = HashMap::new();
        params.insert("ContentEncoding".to_string(), "gzip".to_string());
        params.insert("Tagging".to_string(), "kind=avatar".to_string());

        let fields = ExtraFields::from_params(&params);
        assert_eq!(fields.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(fields.tagging.as_deref(), Some("kind=avatar"));
        assert_eq!(fields.content_language, None);
        assert_eq!(fields.website_redirect_location, None);
    }

    #[tokio::test]
    async fn connect_requires_credentials() {
        let config = S3ClientConfig {
            region: "us-east-1".to_string(),
            access_key_id: "".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
            endpoint_url: None,
        };

        let err = AwsBackend::connect(config).await.unwrap_err();
        assert!(err.to_string().contains("Access key ID is required"));
    }

    #[tokio::test]
    async fn connect_defaults_the_region() {
        let config = S3ClientConfig {
            region: "".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
            endpoint_url: None,
        };

        let backend = AwsBackend::connect(config).await.unwrap();
        assert_eq!(backend.region.as_deref(), Some("us-east-1"));
    }
}
