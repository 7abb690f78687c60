use anyhow::Result;
use async_trait::async_trait;

use crate::{compdesc::SignatureSpec, digest::Digest};

/// External signing flow that establishes trust without local key material.
///
/// Signatures produced or checked this way are reported as externally
/// trusted rather than key validated.
#[async_trait]
pub trait KeylessProvider: Send + Sync {
    /// Signs `digest` with an ephemeral identity and returns the signature
    /// carrying its certificate as issuer.
    async fn sign(&self, digest: &Digest) -> Result<SignatureSpec>;

    /// Checks `signature` over `digest` against the trusted root certificates.
    async fn verify(
        &self,
        digest: &Digest,
        signature: &SignatureSpec,
        root_certs: &[String],
    ) -> Result<()>;
}
