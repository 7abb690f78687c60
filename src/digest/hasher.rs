use sha2::{Digest as _, Sha256, Sha512};

pub const SHA256: &str = "SHA-256";
pub const SHA512: &str = "SHA-512";
pub const BLAKE3: &str = "BLAKE3";

/// A named hash function.
pub trait Hasher: Send + Sync {
    fn algorithm(&self) -> &str;

    fn hash(&self, data: &[u8]) -> Vec<u8>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn algorithm(&self) -> &str {
        SHA256
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512Hasher;

impl Hasher for Sha512Hasher {
    fn algorithm(&self) -> &str {
        SHA512
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        Sha512::digest(data).to_vec()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn algorithm(&self) -> &str {
        BLAKE3
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        blake3::hash(data).as_bytes().to_vec()
    }
}
