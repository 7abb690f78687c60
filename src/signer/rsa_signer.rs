use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rsa::Pkcs1v15Sign;
use sha2::{Sha256, Sha512};

use crate::{
    compdesc::SignatureSpec,
    digest::{Digest, SHA256, SHA512},
    signer::{digest_bytes, signature_bytes, PrivateKey, PublicKey, Signer, Verifier},
};

pub const RSASSA_PKCS1_V1_5: &str = "RSASSA-PKCS1-V1_5";
pub const RSA_MEDIA_TYPE: &str = "application/vnd.ocm.signature.rsa";

/// RSASSA-PKCS1-v1_5 handler over the prehashed digest.
///
/// SHA-256 and SHA-512 digests are signed with the DigestInfo prefix of their
/// hash; other hashes have no registered prefix and are signed unprefixed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaSigner;

fn scheme(digest: &Digest) -> Pkcs1v15Sign {
    match digest.hash_algorithm.as_str() {
        SHA256 => Pkcs1v15Sign::new::<Sha256>(),
        SHA512 => Pkcs1v15Sign::new::<Sha512>(),
        _ => Pkcs1v15Sign::new_unprefixed(),
    }
}

#[async_trait]
impl Signer for RsaSigner {
    fn algorithm(&self) -> &str {
        RSASSA_PKCS1_V1_5
    }

    async fn sign(
        &self,
        digest: &Digest,
        key: &PrivateKey,
        issuer: Option<&str>,
    ) -> Result<SignatureSpec> {
        log::trace!("Signing digest {digest} with RSA key");
        let PrivateKey::Rsa(key) = key else {
            return Err(anyhow!("{:?} is not an RSA key", key));
        };
        let sig = key.sign(scheme(digest), &digest_bytes(digest)?)?;
        Ok(SignatureSpec {
            algorithm: RSASSA_PKCS1_V1_5.to_owned(),
            value: hex::encode(sig),
            media_type: RSA_MEDIA_TYPE.to_owned(),
            issuer: issuer.map(str::to_owned),
        })
    }
}

impl Verifier for RsaSigner {
    fn algorithm(&self) -> &str {
        RSASSA_PKCS1_V1_5
    }

    fn verify(&self, digest: &Digest, signature: &SignatureSpec, key: &PublicKey) -> Result<()> {
        let PublicKey::Rsa(key) = key else {
            return Err(anyhow!("{:?} is not an RSA key", key));
        };
        key.verify(
            scheme(digest),
            &digest_bytes(digest)?,
            &signature_bytes(signature)?,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::BLAKE3;

    #[tokio::test]
    async fn sign_and_verify_per_hash() {
        let _ = env_logger::builder().is_test(true).try_init();
        let key = PrivateKey::generate_rsa(1024).unwrap();
        for (hash, len) in [(SHA256, 32), (SHA512, 64), (BLAKE3, 32)] {
            let digest = Digest::new(hash, "jsonNormalisation/v1", hex::encode(vec![1u8; len]));
            let sig = RsaSigner.sign(&digest, &key, None).await.unwrap();
            assert_eq!(sig.media_type, RSA_MEDIA_TYPE);
            RsaSigner.verify(&digest, &sig, &key.public_key()).unwrap();

            let tampered = Digest::new(hash, "jsonNormalisation/v1", hex::encode(vec![2u8; len]));
            assert!(RsaSigner.verify(&tampered, &sig, &key.public_key()).is_err());
        }
    }
}
