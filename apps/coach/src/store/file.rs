use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{validate_key, BlobStore, StoreError};

/// On-device blob store: one `<key>.json` file per blob under a root directory.
///
/// Writes go to a temp file first and are renamed into place, so a crash mid-write
/// leaves the previous blob intact.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Creates the root directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!("Blob store opened at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn read_blob(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        let path = self.blob_path(key);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn write_blob(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        validate_key(key)?;
        let path = self.blob_path(key);
        let tmp = self.root.join(format!(".{key}.json.tmp"));

        let bytes = serde_json::to_vec(value)?;
        tokio::fs::write(&tmp, &bytes).await?;
        let file = tokio::fs::File::open(&tmp).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Persisted blob '{}' ({} bytes)", key, bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_blob_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).await.unwrap();
        assert!(store.read_blob("action_queue").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileBlobStore::open(dir.path()).await.unwrap();
            store
                .write_blob("completed_units", &json!([1, 2, 3]))
                .await
                .unwrap();
        }

        let reopened = FileBlobStore::open(dir.path()).await.unwrap();
        let value = reopened.read_blob("completed_units").await.unwrap();
        assert_eq!(value, Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_whole_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).await.unwrap();
        store.write_blob("content_cache", &json!({"a": 1})).await.unwrap();
        store.write_blob("content_cache", &json!({"b": 2})).await.unwrap();

        let value = store.read_blob("content_cache").await.unwrap().unwrap();
        assert_eq!(value, json!({"b": 2}));
        assert!(!dir.path().join(".content_cache.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("action_queue.json"), b"{not json").unwrap();
        let store = FileBlobStore::open(dir.path()).await.unwrap();

        let err = store.read_blob("action_queue").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialize(_)));
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).await.unwrap();
        let err = store.write_blob("../escape", &json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
