//! Persistent Store Adapter: the durable key/value primitive every other
//! component sits on.
//!
//! Three independent blobs are kept (completed units, pending actions, content
//! cache) so that corruption or loss of one never cascades into the others.
//! A failed write is a fatal local-storage error: there is no safe fallback for
//! being unable to record user intent.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod file;
#[cfg(test)]
pub(crate) mod memory;

pub use file::FileBlobStore;
#[cfg(test)]
pub(crate) use memory::MemoryBlobStore;

/// Blob holding the set of completed unit ids.
pub const COMPLETED_UNITS_KEY: &str = "completed_units";
/// Blob holding the pending action queue.
pub const ACTION_QUEUE_KEY: &str = "action_queue";
/// Blob holding the topic → content cache map.
pub const CONTENT_CACHE_KEY: &str = "content_cache";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid blob key '{0}'")]
    InvalidKey(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable JSON blob storage.
///
/// `write_blob` must not return until the value is durable.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read_blob(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn write_blob(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}

/// Keys become file names, so only a conservative character set is accepted.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
