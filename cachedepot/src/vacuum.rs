use async_trait::async_trait;
use ociclient::OciDigest;
use opendal::Operator;
use tracing::info;

use crate::error::StoreError;
use crate::registry::BlobReclaimer;
use crate::storage::blob_data_path;

/// Removes blob data from the backing store
#[derive(Debug, Clone)]
pub struct Vacuum {
    operator: Operator,
}

impl Vacuum {
    pub fn new(operator: Operator) -> Self {
        Self { operator }
    }

    /// Delete the data behind `digest`. Data that is already gone is not an error.
    pub async fn remove_blob(&self, digest: &OciDigest) -> Result<(), StoreError> {
        let path = blob_data_path(digest);
        info!("Vacuum: deleting blob {} ({})", digest, path);
        self.operator.delete(&path).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobReclaimer for Vacuum {
    async fn reclaim_blob(&self, digest: &OciDigest) -> Result<(), StoreError> {
        self.remove_blob(digest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, StorageConfig};
    use crate::storage::CacheStore;
    use bytes::Bytes;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_remove_blob_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig {
            port: 0,
            storage: StorageConfig::fs(temp_dir.path()),
        };
        let store = CacheStore::new(&config).await.unwrap();
        let digest = store.put_blob(Bytes::from_static(b"data")).await.unwrap();

        let vacuum = Vacuum::new(store.operator().clone());
        vacuum.reclaim_blob(&digest).await.unwrap();
        assert!(!store.blob_exists(&digest).await.unwrap());

        vacuum.reclaim_blob(&digest).await.unwrap();
    }
}
