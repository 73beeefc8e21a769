//! Storage engine contract consumed by upload middleware
//!
//! Upload middleware hands each incoming file to a [`StorageEngine`] and
//! gets back either a stored-file descriptor or the error that stopped the
//! transfer. Engines are shared (`Arc<dyn StorageEngine>`) and must be safe
//! to call concurrently for every file of every in-flight request.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{IncomingFile, RequestContext, StoredFile};

pub mod s3;

/// Storage engine contract.
///
/// Exactly one outcome is produced per file: `handle_file` either stores
/// the whole stream and returns the descriptor, or fails with the first
/// error it hits. `remove_file` lets the host roll back already-stored
/// files when a later part of the same request fails.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Store one incoming file, consuming its byte stream.
    async fn handle_file(
        &self,
        ctx: &RequestContext,
        file: IncomingFile,
    ) -> Result<StoredFile, StorageError>;

    /// Remove a previously stored file.
    async fn remove_file(
        &self,
        ctx: &RequestContext,
        file: &StoredFile,
    ) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_engine_is_object_safe() {
        fn assert_object_safe(_: &dyn StorageEngine) {}
        let _ = assert_object_safe;
    }
}
