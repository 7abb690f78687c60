use std::{collections::HashMap, fmt};

use anyhow::{anyhow, Result};

/// Supported key types.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::EnumString, strum::Display)]
pub enum KeyType {
    #[cfg(feature = "signer-rsa")]
    #[strum(serialize = "rsa")]
    Rsa,
    #[cfg(feature = "signer-ed25519")]
    #[strum(serialize = "ed25519")]
    Ed25519,
    #[cfg(feature = "signer-p256")]
    #[strum(serialize = "p256")]
    P256,
}

/// RSA modulus size for generated keys.
#[cfg(feature = "signer-rsa")]
pub const RSA_KEY_BITS: usize = 2048;

#[derive(Clone)]
pub enum PrivateKey {
    #[cfg(feature = "signer-rsa")]
    Rsa(rsa::RsaPrivateKey),
    #[cfg(feature = "signer-ed25519")]
    Ed25519(ed25519_dalek::SigningKey),
    #[cfg(feature = "signer-p256")]
    P256(p256::ecdsa::SigningKey),
}

#[derive(Clone, PartialEq, Eq)]
pub enum PublicKey {
    #[cfg(feature = "signer-rsa")]
    Rsa(rsa::RsaPublicKey),
    #[cfg(feature = "signer-ed25519")]
    Ed25519(ed25519_dalek::VerifyingKey),
    #[cfg(feature = "signer-p256")]
    P256(p256::ecdsa::VerifyingKey),
}

impl PrivateKey {
    /// Creates a random key of the given type.
    pub fn generate(key_type: KeyType) -> Result<Self> {
        let mut rng = rand::rngs::OsRng;
        match key_type {
            #[cfg(feature = "signer-rsa")]
            KeyType::Rsa => Self::generate_rsa(RSA_KEY_BITS),
            #[cfg(feature = "signer-ed25519")]
            KeyType::Ed25519 => Ok(PrivateKey::Ed25519(ed25519_dalek::SigningKey::generate(
                &mut rng,
            ))),
            #[cfg(feature = "signer-p256")]
            KeyType::P256 => Ok(PrivateKey::P256(p256::ecdsa::SigningKey::random(&mut rng))),
        }
    }

    /// Creates a random RSA key with a modulus of `bits`.
    #[cfg(feature = "signer-rsa")]
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        Ok(PrivateKey::Rsa(rsa::RsaPrivateKey::new(
            &mut rand::rngs::OsRng,
            bits,
        )?))
    }

    /// Imports a private key.
    ///
    /// # Arguments
    ///
    /// * `key_type` - The type of the key.
    /// * `secret_key` - PKCS#8 DER for RSA, the raw 32-byte secret for the
    ///   elliptic curve types.
    pub fn import(key_type: KeyType, secret_key: &[u8]) -> Result<Self> {
        match key_type {
            #[cfg(feature = "signer-rsa")]
            KeyType::Rsa => {
                use rsa::pkcs8::DecodePrivateKey;
                Ok(PrivateKey::Rsa(rsa::RsaPrivateKey::from_pkcs8_der(secret_key)?))
            }
            #[cfg(feature = "signer-ed25519")]
            KeyType::Ed25519 => {
                let bytes: [u8; 32] = secret_key
                    .try_into()
                    .map_err(|_| anyhow!("Ed25519 secret key must be 32 bytes"))?;
                Ok(PrivateKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                    &bytes,
                )))
            }
            #[cfg(feature = "signer-p256")]
            KeyType::P256 => Ok(PrivateKey::P256(p256::ecdsa::SigningKey::from_slice(
                secret_key,
            )?)),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            #[cfg(feature = "signer-rsa")]
            PrivateKey::Rsa(_) => KeyType::Rsa,
            #[cfg(feature = "signer-ed25519")]
            PrivateKey::Ed25519(_) => KeyType::Ed25519,
            #[cfg(feature = "signer-p256")]
            PrivateKey::P256(_) => KeyType::P256,
        }
    }

    /// Derives the matching public key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            #[cfg(feature = "signer-rsa")]
            PrivateKey::Rsa(k) => PublicKey::Rsa(k.to_public_key()),
            #[cfg(feature = "signer-ed25519")]
            PrivateKey::Ed25519(k) => PublicKey::Ed25519(k.verifying_key()),
            #[cfg(feature = "signer-p256")]
            PrivateKey::P256(k) => PublicKey::P256(p256::ecdsa::VerifyingKey::from(k)),
        }
    }
}

impl PublicKey {
    pub fn key_type(&self) -> KeyType {
        match self {
            #[cfg(feature = "signer-rsa")]
            PublicKey::Rsa(_) => KeyType::Rsa,
            #[cfg(feature = "signer-ed25519")]
            PublicKey::Ed25519(_) => KeyType::Ed25519,
            #[cfg(feature = "signer-p256")]
            PublicKey::P256(_) => KeyType::P256,
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.key_type())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.key_type())
    }
}

/// Key material for signing and verification, keyed by signature name.
///
/// The ring is read-only once handed to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    private_keys: HashMap<String, PrivateKey>,
    public_keys: HashMap<String, PublicKey>,
    issuers: HashMap<String, String>,
    root_certs: Vec<String>,
}

impl KeyRing {
    /// Creates an empty key ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the private key for the signature `name`.
    pub fn with_private_key(mut self, name: impl Into<String>, key: PrivateKey) -> Self {
        self.private_keys.insert(name.into(), key);
        self
    }

    /// Adds the public key for the signature `name`.
    pub fn with_public_key(mut self, name: impl Into<String>, key: PublicKey) -> Self {
        self.public_keys.insert(name.into(), key);
        self
    }

    pub fn with_issuer(mut self, name: impl Into<String>, issuer: impl Into<String>) -> Self {
        self.issuers.insert(name.into(), issuer.into());
        self
    }

    /// Adds a PEM encoded root certificate for keyless verification.
    pub fn with_root_cert(mut self, pem: impl Into<String>) -> Self {
        self.root_certs.push(pem.into());
        self
    }

    /// The private key for the signature `name`.
    pub fn private_key(&self, name: &str) -> Option<&PrivateKey> {
        self.private_keys.get(name)
    }

    /// Explicitly configured public key. A private key alone does not count.
    pub fn public_key(&self, name: &str) -> Option<&PublicKey> {
        self.public_keys.get(name)
    }

    /// Key for checking a signature: the explicit public key, or the one
    /// derived from the private key of that name.
    pub fn verification_key(&self, name: &str) -> Option<PublicKey> {
        self.public_keys
            .get(name)
            .cloned()
            .or_else(|| self.private_keys.get(name).map(PrivateKey::public_key))
    }

    pub fn issuer(&self, name: &str) -> Option<&str> {
        self.issuers.get(name).map(String::as_str)
    }

    pub fn root_certs(&self) -> &[String] {
        &self.root_certs
    }
}
