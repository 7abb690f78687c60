//! Registries of named algorithms.
//!
//! Both registries are append-only. The process-wide defaults are built once
//! on first use; callers that need isolation build their own instances and
//! pass them explicitly through [`Registries`].

use std::{collections::BTreeMap, sync::Arc};

use log::trace;
use once_cell::sync::Lazy;

use crate::{
    access::AccessTypeRegistry,
    compdesc::{JsonNormalisationV1, JsonNormalisationV2, Normalization},
    digest::{Blake3Hasher, Hasher, Sha256Hasher, Sha512Hasher},
    errors::{Error, Result},
    signer::{Signer, Verifier},
};

pub const KIND_NORMALIZATION: &str = "normalization algorithm";
pub const KIND_HASH: &str = "hash algorithm";
pub const KIND_SIGNER: &str = "signing algorithm";
pub const KIND_VERIFIER: &str = "verification algorithm";

/// Normalizations, hashers, signers and verifiers keyed by name.
#[derive(Default)]
pub struct AlgorithmRegistry {
    normalizations: BTreeMap<String, Arc<dyn Normalization>>,
    hashers: BTreeMap<String, Arc<dyn Hasher>>,
    signers: BTreeMap<String, Arc<dyn Signer>>,
    verifiers: BTreeMap<String, Arc<dyn Verifier>>,
}

fn insert<T: ?Sized>(
    map: &mut BTreeMap<String, Arc<T>>,
    kind: &str,
    name: &str,
    value: Arc<T>,
) -> Result<()> {
    if map.contains_key(name) {
        return Err(Error::already_exists(kind, name));
    }
    trace!("registering {kind} {name}");
    map.insert(name.to_owned(), value);
    Ok(())
}

fn lookup<T: ?Sized>(map: &BTreeMap<String, Arc<T>>, kind: &str, name: &str) -> Result<Arc<T>> {
    map.get(name)
        .cloned()
        .ok_or_else(|| Error::unknown(kind, name))
}

impl AlgorithmRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in algorithm of the enabled features.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add_defaults();
        registry
    }

    fn add_defaults(&mut self) {
        let normalizations: [Arc<dyn Normalization>; 2] =
            [Arc::new(JsonNormalisationV1), Arc::new(JsonNormalisationV2)];
        for n in normalizations {
            self.normalizations.insert(n.name().to_owned(), n);
        }
        let hashers: [Arc<dyn Hasher>; 3] = [
            Arc::new(Sha256Hasher),
            Arc::new(Sha512Hasher),
            Arc::new(Blake3Hasher),
        ];
        for h in hashers {
            self.hashers.insert(h.algorithm().to_owned(), h);
        }
        #[cfg(feature = "signer-rsa")]
        self.put_handler(crate::signer::RsaSigner);
        #[cfg(feature = "signer-ed25519")]
        self.put_handler(crate::signer::Ed25519Signer);
        #[cfg(feature = "signer-p256")]
        self.put_handler(crate::signer::P256Signer);
    }

    #[allow(dead_code)]
    fn put_handler<H: Signer + Verifier + Clone + 'static>(&mut self, handler: H) {
        let name = Signer::algorithm(&handler).to_owned();
        self.verifiers.insert(name.clone(), Arc::new(handler.clone()));
        self.signers.insert(name, Arc::new(handler));
    }

    /// Registers `n` under its name.
    ///
    /// # Returns
    ///
    /// An already-exists error if the name is taken.
    pub fn register_normalization(&mut self, n: Arc<dyn Normalization>) -> Result<()> {
        let name = n.name().to_owned();
        insert(&mut self.normalizations, KIND_NORMALIZATION, &name, n)
    }

    pub fn register_hasher(&mut self, h: Arc<dyn Hasher>) -> Result<()> {
        let name = h.algorithm().to_owned();
        insert(&mut self.hashers, KIND_HASH, &name, h)
    }

    pub fn register_signer(&mut self, s: Arc<dyn Signer>) -> Result<()> {
        let name = s.algorithm().to_owned();
        insert(&mut self.signers, KIND_SIGNER, &name, s)
    }

    pub fn register_verifier(&mut self, v: Arc<dyn Verifier>) -> Result<()> {
        let name = v.algorithm().to_owned();
        insert(&mut self.verifiers, KIND_VERIFIER, &name, v)
    }

    /// Registers a handler as both signer and verifier of its algorithm.
    pub fn register_handler<H: Signer + Verifier + 'static>(&mut self, handler: H) -> Result<()> {
        let handler = Arc::new(handler);
        let name = Signer::algorithm(handler.as_ref()).to_owned();
        if self.signers.contains_key(&name) {
            return Err(Error::already_exists(KIND_SIGNER, name));
        }
        insert(&mut self.verifiers, KIND_VERIFIER, &name, handler.clone() as Arc<dyn Verifier>)?;
        insert(&mut self.signers, KIND_SIGNER, &name, handler as Arc<dyn Signer>)
    }

    /// Looks up a normalisation, failing with not-found for unknown names.
    pub fn normalization(&self, name: &str) -> Result<Arc<dyn Normalization>> {
        lookup(&self.normalizations, KIND_NORMALIZATION, name)
    }

    /// Looks up a hash algorithm, failing with not-found for unknown names.
    pub fn hasher(&self, name: &str) -> Result<Arc<dyn Hasher>> {
        lookup(&self.hashers, KIND_HASH, name)
    }

    /// Looks up a signing handler by algorithm name.
    pub fn signer(&self, name: &str) -> Result<Arc<dyn Signer>> {
        lookup(&self.signers, KIND_SIGNER, name)
    }

    /// Looks up a verification handler by algorithm name.
    pub fn verifier(&self, name: &str) -> Result<Arc<dyn Verifier>> {
        lookup(&self.verifiers, KIND_VERIFIER, name)
    }

    pub fn normalization_names(&self) -> Vec<&str> {
        self.normalizations.keys().map(String::as_str).collect()
    }

    pub fn hasher_names(&self) -> Vec<&str> {
        self.hashers.keys().map(String::as_str).collect()
    }

    pub fn signer_names(&self) -> Vec<&str> {
        self.signers.keys().map(String::as_str).collect()
    }
}

static DEFAULT_ALGORITHMS: Lazy<Arc<AlgorithmRegistry>> =
    Lazy::new(|| Arc::new(AlgorithmRegistry::with_defaults()));

static DEFAULT_ACCESS_TYPES: Lazy<Arc<AccessTypeRegistry>> =
    Lazy::new(|| Arc::new(AccessTypeRegistry::with_defaults()));

/// The process-wide algorithm registry.
pub fn default_algorithms() -> Arc<AlgorithmRegistry> {
    DEFAULT_ALGORITHMS.clone()
}

/// The process-wide access type registry.
pub fn default_access_types() -> Arc<AccessTypeRegistry> {
    DEFAULT_ACCESS_TYPES.clone()
}

/// Registry context handed to signing and verification.
#[derive(Clone)]
pub struct Registries {
    pub algorithms: Arc<AlgorithmRegistry>,
    pub access_types: Arc<AccessTypeRegistry>,
}

impl Registries {
    pub fn new(algorithms: AlgorithmRegistry, access_types: AccessTypeRegistry) -> Self {
        Self {
            algorithms: Arc::new(algorithms),
            access_types: Arc::new(access_types),
        }
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self {
            algorithms: default_algorithms(),
            access_types: default_access_types(),
        }
    }
}

impl std::fmt::Debug for Registries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registries")
            .field("normalizations", &self.algorithms.normalization_names())
            .field("hashers", &self.algorithms.hasher_names())
            .field("signers", &self.algorithms.signer_names())
            .field("access_types", &self.access_types.names())
            .finish()
    }
}
