use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, Verifier as _};

use crate::{
    compdesc::SignatureSpec,
    digest::Digest,
    signer::{digest_bytes, signature_bytes, PrivateKey, PublicKey, Signer, Verifier},
};

pub const ED25519: &str = "ed25519";
pub const ED25519_MEDIA_TYPE: &str = "application/vnd.ocm.signature.ed25519";

/// Ed25519 handler. Signs the raw digest bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Signer;

#[async_trait]
impl Signer for Ed25519Signer {
    fn algorithm(&self) -> &str {
        ED25519
    }

    async fn sign(
        &self,
        digest: &Digest,
        key: &PrivateKey,
        issuer: Option<&str>,
    ) -> Result<SignatureSpec> {
        log::trace!("Signing digest {digest} with Ed25519 key");
        let PrivateKey::Ed25519(key) = key else {
            return Err(anyhow!("{:?} is not an ed25519 key", key));
        };
        let sig = key.sign(&digest_bytes(digest)?);
        Ok(SignatureSpec {
            algorithm: ED25519.to_owned(),
            value: hex::encode(sig.to_bytes()),
            media_type: ED25519_MEDIA_TYPE.to_owned(),
            issuer: issuer.map(str::to_owned),
        })
    }
}

impl Verifier for Ed25519Signer {
    fn algorithm(&self) -> &str {
        ED25519
    }

    fn verify(&self, digest: &Digest, signature: &SignatureSpec, key: &PublicKey) -> Result<()> {
        let PublicKey::Ed25519(key) = key else {
            return Err(anyhow!("{:?} is not an ed25519 key", key));
        };
        let sig = ed25519_dalek::Signature::from_slice(&signature_bytes(signature)?)?;
        key.verify(&digest_bytes(digest)?, &sig)?;
        Ok(())
    }
}
