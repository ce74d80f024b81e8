use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{validate_key, BlobStore, StoreError};

/// Volatile blob store with write-failure injection.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every subsequent write fails with `StoreError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seeds a blob directly, bypassing failure injection.
    pub async fn insert_raw(&self, key: &str, value: Value) {
        self.blobs.lock().await.insert(key.to_string(), value);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read_blob(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        Ok(self.blobs.lock().await.get(key).cloned())
    }

    async fn write_blob(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        validate_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "write to '{key}' rejected"
            )));
        }
        self.blobs.lock().await.insert(key.to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryBlobStore::new();
        store.write_blob("action_queue", &json!([])).await.unwrap();

        store.set_fail_writes(true);
        assert!(store.write_blob("action_queue", &json!([1])).await.is_err());
        assert_eq!(store.read_blob("action_queue").await.unwrap(), Some(json!([])));
        assert_eq!(store.write_count(), 1);
    }
}
