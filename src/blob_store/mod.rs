use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::digest::oci::oci_digest;

pub mod in_memory;
pub mod local_fs;

pub use in_memory::InMemoryStore;
pub use local_fs::LocalFs;

/// Content-addressable blob storage keyed by OCI digest (`sha256:<hex>`).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Initialize the store
    async fn init(&mut self) -> Result<()>;

    /// Check if a digest exists in the store
    async fn exists(&self, digest: &str) -> Result<bool>;

    /// Get a blob from the store
    async fn get(&self, digest: &str) -> Result<Option<Vec<u8>>>;

    /// Put a blob into the store
    /// If digest is provided, it will be compared to the computed digest. If they don't match, an error will be returned.
    /// Writing a blob that is already stored is a no-op.
    async fn put(&self, blob: Vec<u8>, digest: Option<&str>) -> Result<String>;
}

/// Calculates the digest of the blob.
/// If expected_digest is provided, it will be compared to the computed digest.
/// Returns OK(computed_digest) if the computed digest matches the expected digest.
fn calc_and_validate_digest(blob: &[u8], expected_digest: Option<&str>) -> Result<String> {
    let computed_digest = oci_digest(blob);

    if let Some(digest) = expected_digest {
        if digest != computed_digest {
            return Err(anyhow!(
                "Computed digest '{computed_digest}' doesn't match provided digest '{digest}'.",
            ));
        }
    }
    Ok(computed_digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_expected_digest() {
        let d = calc_and_validate_digest(b"hello", None).unwrap();
        assert!(calc_and_validate_digest(b"hello", Some(&d)).is_ok());
        let err = calc_and_validate_digest(b"hullo", Some(&d)).unwrap_err();
        assert!(err.to_string().contains("doesn't match"));
    }
}
