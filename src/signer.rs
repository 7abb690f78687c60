/// ECDSA over P-256
#[cfg(feature = "signer-p256")]
pub mod p256_signer;
/// Ed25519 (EdDSA)
#[cfg(feature = "signer-ed25519")]
pub mod ed25519_signer;
/// Key material and the key ring
pub mod keys;
/// RSASSA-PKCS1-v1_5
#[cfg(feature = "signer-rsa")]
pub mod rsa_signer;

use anyhow::Result;
use async_trait::async_trait;

#[cfg(feature = "signer-p256")]
pub use p256_signer::*;
#[cfg(feature = "signer-ed25519")]
pub use ed25519_signer::*;
pub use keys::*;
#[cfg(feature = "signer-rsa")]
pub use rsa_signer::*;

use crate::{compdesc::SignatureSpec, digest::Digest};

/// Trait for signature handlers producing signatures over digests.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Registered algorithm name, recorded in every signature it produces.
    fn algorithm(&self) -> &str;

    /// Signs the digest value.
    ///
    /// # Arguments
    ///
    /// * `digest` - The digest to sign. Its hex value is decoded and signed as
    ///   a prehashed message where the algorithm allows it.
    /// * `key` - Private key matching the handler's algorithm.
    /// * `issuer` - Optional identity recorded with the signature.
    ///
    /// # Returns
    ///
    /// The signature with hex encoded value.
    async fn sign(
        &self,
        digest: &Digest,
        key: &PrivateKey,
        issuer: Option<&str>,
    ) -> Result<SignatureSpec>;
}

/// Trait for checking a signature value against a digest and public key.
pub trait Verifier: Send + Sync {
    fn algorithm(&self) -> &str;

    fn verify(&self, digest: &Digest, signature: &SignatureSpec, key: &PublicKey) -> Result<()>;
}

/// Bytes a handler signs for `digest`.
pub(crate) fn digest_bytes(digest: &Digest) -> Result<Vec<u8>> {
    Ok(hex::decode(&digest.value)?)
}

pub(crate) fn signature_bytes(signature: &SignatureSpec) -> Result<Vec<u8>> {
    Ok(hex::decode(&signature.value)?)
}
