//! Storage engine error types

use thiserror::Error;

/// Errors surfaced by the storage engine and its S3 backend.
///
/// The engine performs no retries and no interpretation of backend
/// failures; every error propagates to the caller exactly once.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Invalid engine configuration, rejected at construction time,
    /// or a resolved extra-parameter set the engine refuses to forward.
    #[error("Invalid storage engine options: {0}")]
    InvalidOptions(String),

    /// A per-file option resolver failed. Wraps the resolver's error
    /// unchanged.
    #[error("Failed to resolve upload parameter: {0}")]
    Resolve(anyhow::Error),

    /// The backend rejected or aborted the upload.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// The backend rejected the delete.
    #[error("Delete failed: {0}")]
    Delete(String),

    /// The multipart request body could not be parsed.
    #[error("Multipart request error: {0}")]
    Multipart(String),

    /// The incoming byte stream failed mid-read.
    #[error("Failed to read upload stream: {0}")]
    Stream(#[from] std::io::Error),
}

impl StorageError {
    /// Convenience constructor for resolver failures, useful inside
    /// host-provided resolver closures.
    pub fn resolve(message: impl Into<String>) -> Self {
        StorageError::Resolve(anyhow::anyhow!(message.into()))
    }
}
