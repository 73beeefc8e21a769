//! Driving an axum multipart request through a storage engine
//!
//! [`process_multipart`] walks the parts of a `multipart/form-data` body in
//! wire order: parts without a filename are collected as text fields, parts
//! with a filename are streamed through the engine as they are parsed, so a
//! file is never buffered in full. On the first failure the files already
//! stored for this request are removed again and the error is returned.

use std::collections::HashMap;
use std::io;

use axum::extract::multipart::{Multipart, MultipartError};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::SinkExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::StorageEngine;
use crate::error::StorageError;
use crate::models::{FileInfo, IncomingFile, RequestContext, StoredFile};

/// Everything a multipart request carried: text fields plus the stored
/// files, in wire order.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct UploadedForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<StoredFile>,
}

/// Process a multipart request, storing every file part through `engine`.
///
/// A failed part aborts processing; files stored earlier in the same
/// request are removed again before the error is returned, so a failed
/// request leaves nothing behind.
pub async fn process_multipart(
    engine: &dyn StorageEngine,
    ctx: &RequestContext,
    mut multipart: Multipart,
) -> Result<UploadedForm, StorageError> {
    let mut form = UploadedForm::default();

    match drive(engine, ctx, &mut multipart, &mut form).await {
        Ok(()) => Ok(form),
        Err(e) => {
            for file in &form.files {
                if let Err(remove_err) = engine.remove_file(ctx, file).await {
                    warn!(
                        "Failed to roll back stored file {}/{}: {}",
                        file.bucket, file.key, remove_err
                    );
                }
            }
            Err(e)
        }
    }
}

async fn drive(
    engine: &dyn StorageEngine,
    ctx: &RequestContext,
    multipart: &mut Multipart,
    form: &mut UploadedForm,
) -> Result<(), StorageError> {
    while let Some(mut field) = multipart.next_field().await.map_err(as_multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let value = field.text().await.map_err(as_multipart_error)?;
            form.fields.insert(field_name, value);
            continue;
        };

        debug!("Processing file part {} ({})", field_name, file_name);

        let info = FileInfo {
            field_name,
            file_name,
            content_type: field.content_type().map(str::to_string),
            encoding: field
                .headers()
                .get("content-transfer-encoding")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        };

        // The part borrows the multipart parser, so it cannot travel inside
        // the ('static) file stream; bridge it through a bounded channel and
        // pump while the engine uploads.
        let (mut tx, rx) = mpsc::channel::<io::Result<Bytes>>(8);
        let incoming = IncomingFile {
            info,
            stream: Box::pin(rx),
        };

        let upload = engine.handle_file(ctx, incoming);
        let pump = async move {
            loop {
                match field.chunk().await {
                    Ok(Some(chunk)) => {
                        // The receiver is gone once the engine has failed;
                        // stop feeding and let the upload error surface.
                        if tx.send(Ok(chunk)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(io::Error::other(e))).await;
                        break;
                    }
                }
            }
        };

        let (stored, ()) = tokio::join!(upload, pump);
        form.files.push(stored?);
    }

    Ok(())
}

fn as_multipart_error(error: MultipartError) -> StorageError {
    StorageError::Multipart(error.to_string())
}
