use std::{fs, path::PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, trace};

use crate::{
    blob_store::{calc_and_validate_digest, BlobStore},
    digest::oci,
};

/// Blob store in a local directory, one file per blob named
/// `<algorithm>.<hex>`.
pub struct LocalFs {
    path: PathBuf,
}

impl LocalFs {
    /// Creates a store rooted at `path`. The directory is created by
    /// [`BlobStore::init`].
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// File of the blob `digest`. Keys that are not `<algorithm>:<hex>` are
    /// rejected so no key can name a file outside the store.
    fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        let (algo, value) = oci::parse(digest)?;
        if !algo.bytes().all(|b| b.is_ascii_alphanumeric()) {
            anyhow::bail!("invalid blob key '{digest}'");
        }
        Ok(self.path.join(format!("{algo}.{value}")))
    }
}

#[async_trait]
impl BlobStore for LocalFs {
    async fn init(&mut self) -> Result<()> {
        fs::create_dir_all(&self.path)?;
        Ok(())
    }

    async fn exists(&self, digest: &str) -> Result<bool> {
        trace!("check exists {digest}.");

        Ok(self.blob_path(digest)?.exists())
    }

    async fn get(&self, digest: &str) -> Result<Option<Vec<u8>>> {
        trace!("get {digest}.");

        let path = self.blob_path(digest)?;
        if path.exists() {
            let blob = fs::read(path)?;
            Ok(Some(blob))
        } else {
            Ok(None)
        }
    }

    async fn put(&self, blob: Vec<u8>, digest: Option<&str>) -> Result<String> {
        let digest = calc_and_validate_digest(&blob, digest)?;

        trace!("put {digest}. blob size: {}", blob.len());

        let path = self.blob_path(&digest)?;
        if path.exists() {
            debug!("blob with digest {digest} already exists.");
        } else {
            fs::write(path, &blob)?;
        }

        Ok(digest)
    }
}
