use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;

use crate::{
    access::BlobReference, blob_store::BlobStore, compdesc::ComponentDescriptor,
    history::NameVersion,
};

/// Lookup of component versions and their blobs.
///
/// Network access, credentials and retry policy live behind this trait; the
/// pipeline calls it under a timeout and never retries.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns the descriptor of `nv`, or `None` if it does not exist.
    async fn lookup(&self, nv: &NameVersion) -> Result<Option<ComponentDescriptor>>;

    /// Returns the content a resource of `owner` points to.
    async fn fetch_blob(
        &self,
        owner: &NameVersion,
        reference: &BlobReference,
    ) -> Result<Option<Vec<u8>>>;

    /// Stores an updated descriptor.
    async fn update(&self, cd: &ComponentDescriptor) -> Result<()>;
}

/// Resolver over descriptors held in memory.
///
/// Local blobs are kept in a [`BlobStore`]; remote locators map to content
/// registered with [`InMemoryRepository::add_remote_blob`].
pub struct InMemoryRepository {
    descriptors: RwLock<HashMap<NameVersion, ComponentDescriptor>>,
    blobs: Arc<dyn BlobStore>,
    remote: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryRepository {
    /// Creates an empty repository keeping local blobs in `blobs`.
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            blobs,
            remote: RwLock::new(HashMap::new()),
        }
    }

    /// Stores `cd`, replacing an earlier descriptor of the same version.
    pub fn add(&self, cd: ComponentDescriptor) -> Result<()> {
        let mut descriptors = self
            .descriptors
            .write()
            .map_err(|_| anyhow!("descriptor map poisoned"))?;
        descriptors.insert(cd.name_version(), cd);
        Ok(())
    }

    /// Stores a local blob and returns its digest.
    pub async fn add_local_blob(&self, blob: Vec<u8>) -> Result<String> {
        self.blobs.put(blob, None).await
    }

    /// Makes `blob` fetchable through a non-local access with `locator`.
    pub fn add_remote_blob(&self, locator: impl Into<String>, blob: Vec<u8>) -> Result<()> {
        let mut remote = self
            .remote
            .write()
            .map_err(|_| anyhow!("remote blob map poisoned"))?;
        remote.insert(locator.into(), blob);
        Ok(())
    }

    /// Current state of the descriptor `nv`.
    pub fn get(&self, nv: &NameVersion) -> Option<ComponentDescriptor> {
        self.descriptors.read().ok()?.get(nv).cloned()
    }

    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }
}

#[async_trait]
impl Resolver for InMemoryRepository {
    async fn lookup(&self, nv: &NameVersion) -> Result<Option<ComponentDescriptor>> {
        let descriptors = self
            .descriptors
            .read()
            .map_err(|_| anyhow!("descriptor map poisoned"))?;
        Ok(descriptors.get(nv).cloned())
    }

    async fn fetch_blob(
        &self,
        owner: &NameVersion,
        reference: &BlobReference,
    ) -> Result<Option<Vec<u8>>> {
        debug!("fetching blob {reference:?} of {owner}");
        match reference {
            BlobReference::Local { digest, .. } => self.blobs.get(digest).await,
            BlobReference::Remote { locator } => {
                let remote = self
                    .remote
                    .read()
                    .map_err(|_| anyhow!("remote blob map poisoned"))?;
                Ok(remote.get(locator).cloned())
            }
            BlobReference::None => Ok(None),
        }
    }

    async fn update(&self, cd: &ComponentDescriptor) -> Result<()> {
        let mut descriptors = self
            .descriptors
            .write()
            .map_err(|_| anyhow!("descriptor map poisoned"))?;
        descriptors.insert(cd.name_version(), cd.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::InMemoryStore;

    #[tokio::test]
    async fn resolves_descriptors_and_blobs() {
        let repo = InMemoryRepository::new(Arc::new(InMemoryStore::new()));
        let cd = ComponentDescriptor::new("acme.org/app", "1.0.0", "acme");
        let nv = cd.name_version();
        repo.add(cd.clone()).unwrap();

        assert_eq!(repo.lookup(&nv).await.unwrap(), Some(cd));
        assert_eq!(
            repo.lookup(&NameVersion::new("acme.org/app", "2.0.0"))
                .await
                .unwrap(),
            None
        );

        let digest = repo.add_local_blob(b"chart".to_vec()).await.unwrap();
        let local = BlobReference::Local {
            digest,
            media_type: "application/octet-stream".into(),
        };
        assert_eq!(
            repo.fetch_blob(&nv, &local).await.unwrap(),
            Some(b"chart".to_vec())
        );

        repo.add_remote_blob("ghcr.io/acme/app:1.0.0", b"image".to_vec())
            .unwrap();
        let remote = BlobReference::Remote {
            locator: "ghcr.io/acme/app:1.0.0".into(),
        };
        assert_eq!(
            repo.fetch_blob(&nv, &remote).await.unwrap(),
            Some(b"image".to_vec())
        );
        assert_eq!(repo.fetch_blob(&nv, &BlobReference::None).await.unwrap(), None);
    }
}
