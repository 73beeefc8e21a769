//! Engine behavior against the recording mock backend

use std::collections::HashMap;
use std::sync::Arc;

use aws_sdk_s3::types::ServerSideEncryption;
use http::{HeaderMap, HeaderValue};

use multipart_s3::test_helpers::{
    chunked_stream, failing_stream, incoming_file, MockS3Backend, MOCK_ETAG, MOCK_LOCATION,
};
use multipart_s3::{
    FileInfo, IncomingFile, OptionValue, RequestContext, S3StorageEngine, StorageEngine,
    StorageError, UploadOptions, AUTO_CONTENT_TYPE, DEFAULT_CONTENT_TYPE,
};

const PNG: &[u8] = include_bytes!("fixtures/ffffff.png");
const SVG: &[u8] = include_bytes!("fixtures/test.svg");

fn engine_with(
    backend: Arc<MockS3Backend>,
    options: UploadOptions,
) -> S3StorageEngine {
    S3StorageEngine::new(backend, options)
}

fn basic_options() -> UploadOptions {
    UploadOptions::builder()
        .bucket("test")
        .key(OptionValue::resolver(|_ctx, file| {
            let name = file.file_name.clone();
            async move { Ok(name) }
        }))
        .build()
        .unwrap()
}

#[tokio::test]
async fn uploads_a_file_and_reports_backend_fields() {
    let backend = Arc::new(MockS3Backend::new());
    let engine = engine_with(backend.clone(), basic_options());
    let ctx = RequestContext::new();

    let stored = engine
        .handle_file(&ctx, incoming_file("image", "ffffff.png", PNG))
        .await
        .unwrap();

    assert_eq!(stored.field_name, "image");
    assert_eq!(stored.file_name, "ffffff.png");
    assert_eq!(stored.size, 68);
    assert_eq!(stored.bucket, "test");
    assert_eq!(stored.key, "ffffff.png");
    assert_eq!(stored.etag, MOCK_ETAG);
    assert_eq!(stored.location, MOCK_LOCATION);
    assert_eq!(stored.acl, "private");
    assert_eq!(stored.content_type, DEFAULT_CONTENT_TYPE);
    assert_eq!(stored.server_side_encryption, None);
    assert_eq!(stored.storage_class, None);
    assert_eq!(stored.version_id, None);

    let uploads = backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].bucket, "test");
    assert_eq!(uploads[0].key, "ffffff.png");
    assert_eq!(uploads[0].body, PNG);
}

#[tokio::test]
async fn chunked_bodies_are_accounted_in_full() {
    let backend = Arc::new(MockS3Backend::new());
    let engine = engine_with(backend.clone(), basic_options());
    let ctx = RequestContext::new();

    let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let file = IncomingFile {
        info: FileInfo {
            field_name: "blob".to_string(),
            file_name: "blob.bin".to_string(),
            content_type: None,
            encoding: None,
        },
        stream: chunked_stream(&data, 7),
    };

    let stored = engine.handle_file(&ctx, file).await.unwrap();
    assert_eq!(stored.size, 1000);
    assert_eq!(backend.uploads()[0].body, data);
}

#[tokio::test]
async fn key_resolvers_see_the_request_context() {
    let backend = Arc::new(MockS3Backend::new());
    let options = UploadOptions::builder()
        .bucket("test")
        .key(OptionValue::resolver(|ctx, file| {
            let prefix = ctx
                .headers()
                .get("x-upload-prefix")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("misc")
                .to_string();
            let name = file.file_name.clone();
            async move { Ok(format!("{prefix}/{name}")) }
        }))
        .build()
        .unwrap();
    let engine = engine_with(backend.clone(), options);

    let mut headers = HeaderMap::new();
    headers.insert("x-upload-prefix", HeaderValue::from_static("avatars"));
    let ctx = RequestContext::new().with_headers(headers);

    let stored = engine
        .handle_file(&ctx, incoming_file("image", "me.png", PNG))
        .await
        .unwrap();
    assert_eq!(stored.key, "avatars/me.png");
}

#[tokio::test]
async fn server_side_encryption_is_carried_verbatim() {
    for (sse, expected) in [
        (ServerSideEncryption::Aes256, "AES256"),
        (ServerSideEncryption::AwsKms, "aws:kms"),
    ] {
        let backend = Arc::new(MockS3Backend::new());
        let options = UploadOptions::builder()
            .bucket("test")
            .key("ffffff.png")
            .server_side_encryption(sse)
            .build()
            .unwrap();
        let engine = engine_with(backend.clone(), options);
        let ctx = RequestContext::new();

        let stored = engine
            .handle_file(&ctx, incoming_file("image", "ffffff.png", PNG))
            .await
            .unwrap();
        assert_eq!(stored.server_side_encryption.as_deref(), Some(expected));
        assert_eq!(
            backend.uploads()[0].server_side_encryption.as_deref(),
            Some(expected)
        );
    }
}

#[tokio::test]
async fn auto_content_type_follows_the_file_name() {
    let backend = Arc::new(MockS3Backend::new());
    let options = UploadOptions::builder()
        .bucket("test")
        .key(OptionValue::resolver(|_ctx, file| {
            let name = file.file_name.clone();
            async move { Ok(name) }
        }))
        .content_type(AUTO_CONTENT_TYPE)
        .build()
        .unwrap();
    let engine = engine_with(backend.clone(), options);
    let ctx = RequestContext::new();

    let stored = engine
        .handle_file(&ctx, incoming_file("image", "ffffff.png", PNG))
        .await
        .unwrap();
    assert_eq!(stored.content_type, "image/png");
    assert_eq!(stored.content_disposition, None);
    assert_eq!(stored.size, 68);

    let stored = engine
        .handle_file(&ctx, incoming_file("image", "test.svg", SVG))
        .await
        .unwrap();
    assert_eq!(stored.content_type, "image/svg+xml");
    assert_eq!(stored.size, 100);

    let stored = engine
        .handle_file(&ctx, incoming_file("blob", "data.weird", b"data"))
        .await
        .unwrap();
    assert_eq!(stored.content_type, DEFAULT_CONTENT_TYPE);
    assert_eq!(stored.content_disposition.as_deref(), Some("attachment"));
}

#[tokio::test]
async fn metadata_is_forwarded_when_non_empty() {
    let backend = Arc::new(MockS3Backend::new());
    let mut metadata = HashMap::new();
    metadata.insert("uploaded-by".to_string(), "tests".to_string());
    let options = UploadOptions::builder()
        .bucket("test")
        .key("a.bin")
        .metadata(metadata.clone())
        .build()
        .unwrap();
    let engine = engine_with(backend.clone(), options);
    let ctx = RequestContext::new();

    let stored = engine
        .handle_file(&ctx, incoming_file("blob", "a.bin", b"abc"))
        .await
        .unwrap();
    assert_eq!(stored.metadata, Some(metadata.clone()));
    assert_eq!(backend.uploads()[0].metadata, Some(metadata));
}

#[tokio::test]
async fn resolver_failures_abort_before_the_backend_is_called() {
    let backend = Arc::new(MockS3Backend::new());
    let options = UploadOptions::builder()
        .bucket("test")
        .key(OptionValue::resolver(|_ctx, _file| async {
            Err(anyhow::anyhow!("no key for you"))
        }))
        .build()
        .unwrap();
    let engine = engine_with(backend.clone(), options);
    let ctx = RequestContext::new();

    let err = engine
        .handle_file(&ctx, incoming_file("image", "ffffff.png", PNG))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Resolve(_)));
    assert!(err.to_string().contains("no key for you"));
    assert!(backend.uploads().is_empty());
}

#[tokio::test]
async fn backend_failures_propagate_verbatim() {
    let backend = Arc::new(MockS3Backend::failing_uploads("Access Denied"));
    let engine = engine_with(backend, basic_options());
    let ctx = RequestContext::new();

    let err = engine
        .handle_file(&ctx, incoming_file("image", "ffffff.png", PNG))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Upload(_)));
    assert!(err.to_string().contains("Access Denied"));
}

#[tokio::test]
async fn stream_failures_surface_as_stream_errors() {
    let backend = Arc::new(MockS3Backend::new());
    let engine = engine_with(backend, basic_options());
    let ctx = RequestContext::new();

    let file = IncomingFile {
        info: FileInfo {
            field_name: "blob".to_string(),
            file_name: "blob.bin".to_string(),
            content_type: None,
            encoding: None,
        },
        stream: failing_stream("connection reset"),
    };

    let err = engine.handle_file(&ctx, file).await.unwrap_err();
    assert!(matches!(err, StorageError::Stream(_)));
}

#[tokio::test]
async fn sibling_uploads_are_independent() {
    let backend = Arc::new(MockS3Backend::new());
    let options = UploadOptions::builder()
        .bucket("test")
        .key(OptionValue::resolver(|_ctx, file| {
            let name = file.file_name.clone();
            async move {
                if name == "bad.txt" {
                    Err(anyhow::anyhow!("rejected"))
                } else {
                    Ok(name)
                }
            }
        }))
        .build()
        .unwrap();
    let engine = engine_with(backend.clone(), options);
    let ctx = RequestContext::new();

    let (good, bad) = tokio::join!(
        engine.handle_file(&ctx, incoming_file("a", "good.txt", b"good")),
        engine.handle_file(&ctx, incoming_file("b", "bad.txt", b"bad")),
    );

    let good = good.unwrap();
    assert_eq!(good.key, "good.txt");
    assert_eq!(good.etag, MOCK_ETAG);
    assert!(bad.is_err());

    let uploads = backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].key, "good.txt");
}

#[tokio::test]
async fn remove_file_deletes_the_stored_object() {
    let backend = Arc::new(MockS3Backend::new());
    let engine = engine_with(backend.clone(), basic_options());
    let ctx = RequestContext::new();

    let stored = engine
        .handle_file(&ctx, incoming_file("image", "ffffff.png", PNG))
        .await
        .unwrap();
    engine.remove_file(&ctx, &stored).await.unwrap();

    assert_eq!(
        backend.deletes(),
        vec![("test".to_string(), "ffffff.png".to_string())]
    );
}

#[tokio::test]
async fn remove_file_propagates_backend_errors() {
    let backend = Arc::new(MockS3Backend::failing_deletes("NoSuchBucket"));
    let engine = engine_with(backend, basic_options());
    let ctx = RequestContext::new();

    let stored_elsewhere = {
        let backend = Arc::new(MockS3Backend::new());
        let engine = engine_with(backend, basic_options());
        engine
            .handle_file(&ctx, incoming_file("image", "ffffff.png", PNG))
            .await
            .unwrap()
    };

    let err = engine.remove_file(&ctx, &stored_elsewhere).await.unwrap_err();
    assert!(matches!(err, StorageError::Delete(_)));
    assert!(err.to_string().contains("NoSuchBucket"));
}
