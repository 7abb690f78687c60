use anyhow::{anyhow, Result};
use async_trait::async_trait;
use p256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature,
};

use crate::{
    compdesc::SignatureSpec,
    digest::Digest,
    signer::{digest_bytes, signature_bytes, PrivateKey, PublicKey, Signer, Verifier},
};

pub const ECDSA_P256: &str = "ECDSA-P256";
pub const ECDSA_P256_MEDIA_TYPE: &str = "application/vnd.ocm.signature.ecdsa-p256";

/// ECDSA P-256 handler. The digest bytes are hashed once more with SHA-256
/// as part of the ECDSA signature, the value is the fixed-size `r || s`.
#[derive(Debug, Clone, Copy, Default)]
pub struct P256Signer;

#[async_trait]
impl Signer for P256Signer {
    fn algorithm(&self) -> &str {
        ECDSA_P256
    }

    async fn sign(
        &self,
        digest: &Digest,
        key: &PrivateKey,
        issuer: Option<&str>,
    ) -> Result<SignatureSpec> {
        log::trace!("Signing digest {digest} with P256 key");
        let PrivateKey::P256(key) = key else {
            return Err(anyhow!("{:?} is not a P-256 key", key));
        };
        let sig: Signature = key.sign(&digest_bytes(digest)?);
        Ok(SignatureSpec {
            algorithm: ECDSA_P256.to_owned(),
            value: hex::encode(sig.to_bytes()),
            media_type: ECDSA_P256_MEDIA_TYPE.to_owned(),
            issuer: issuer.map(str::to_owned),
        })
    }
}

impl Verifier for P256Signer {
    fn algorithm(&self) -> &str {
        ECDSA_P256
    }

    fn verify(&self, digest: &Digest, signature: &SignatureSpec, key: &PublicKey) -> Result<()> {
        let PublicKey::P256(key) = key else {
            return Err(anyhow!("{:?} is not a P-256 key", key));
        };
        let sig = Signature::from_slice(&signature_bytes(signature)?)?;
        key.verify(&digest_bytes(digest)?, &sig)?;
        Ok(())
    }
}
