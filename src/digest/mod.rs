//! Digest value and the digest engine.
//!
//! A descriptor digest is `hash(normalize(cd))` for a named normalization and
//! a named hash algorithm, both looked up in an [`AlgorithmRegistry`].

pub mod hasher;
pub mod oci;

pub use hasher::{Blake3Hasher, Hasher, Sha256Hasher, Sha512Hasher, BLAKE3, SHA256, SHA512};

use std::fmt;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{compdesc::ComponentDescriptor, errors::Result, registry::AlgorithmRegistry};

/// Normalisation name recorded for digests of raw artifact blobs.
pub const GENERIC_BLOB_DIGEST_V1: &str = "genericBlobDigest/v1";

/// Hash value plus the names of the algorithms that produced it.
///
/// Two digests are equal only if all three fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Digest {
    pub hash_algorithm: String,
    pub normalisation_algorithm: String,
    /// Lowercase hex
    pub value: String,
}

impl Digest {
    pub fn new(
        hash_algorithm: impl Into<String>,
        normalisation_algorithm: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            hash_algorithm: hash_algorithm.into(),
            normalisation_algorithm: normalisation_algorithm.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash_algorithm, self.value)
    }
}

/// Computes the digest of a component descriptor.
///
/// Fails with an unknown-kind error if either algorithm is not registered.
pub fn compute_digest(
    registry: &AlgorithmRegistry,
    cd: &ComponentDescriptor,
    normalization: &str,
    hash: &str,
) -> Result<Digest> {
    let norm = registry.normalization(normalization)?;
    let hasher = registry.hasher(hash)?;
    let normalized = norm.normalize(cd)?;
    let digest = Digest::new(
        hasher.algorithm(),
        norm.name(),
        hex::encode(hasher.hash(&normalized)),
    );
    trace!("digest of {}: {digest}", cd.name_version());
    Ok(digest)
}

/// Computes the digest of an artifact blob.
pub fn blob_digest(registry: &AlgorithmRegistry, data: &[u8], hash: &str) -> Result<Digest> {
    let hasher = registry.hasher(hash)?;
    Ok(Digest::new(
        hasher.algorithm(),
        GENERIC_BLOB_DIGEST_V1,
        hex::encode(hasher.hash(data)),
    ))
}
