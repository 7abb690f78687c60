use std::{collections::HashMap, sync::RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::blob_store::{calc_and_validate_digest, BlobStore};

/// In-memory blob storage
///
/// Stores blobs in a HashMap. Not persistent. Used for testing and as the
/// local blob store of in-memory repositories.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Map of digests to blob data
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for InMemoryStore {
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, digest: &str) -> Result<bool> {
        log::trace!("check exists {digest}.");

        let blobs = self.blobs.read().map_err(|_| anyhow!("blob map poisoned"))?;

        Ok(blobs.contains_key(digest))
    }

    async fn get(&self, digest: &str) -> Result<Option<Vec<u8>>> {
        log::trace!("get {digest}.");

        let blobs = self.blobs.read().map_err(|_| anyhow!("blob map poisoned"))?;

        Ok(blobs.get(digest).map(ToOwned::to_owned))
    }

    async fn put(&self, blob: Vec<u8>, digest: Option<&str>) -> Result<String> {
        let digest = calc_and_validate_digest(&blob, digest)?;

        log::trace!("put {digest}. blob size: {}", blob.len());

        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| anyhow!("blob map poisoned"))?;
        blobs.entry(digest.clone()).or_insert(blob);

        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_exists() {
        let store = InMemoryStore::new();
        let digest = store.put(b"chart".to_vec(), None).await.unwrap();
        assert!(digest.starts_with("sha256:"));
        assert!(store.exists(&digest).await.unwrap());
        assert_eq!(store.get(&digest).await.unwrap(), Some(b"chart".to_vec()));
        assert_eq!(store.get("sha256:00").await.unwrap(), None);

        store.put(b"chart".to_vec(), Some(&digest)).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.put(b"other".to_vec(), Some(&digest)).await.is_err());
    }
}
