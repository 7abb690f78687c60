use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    compdesc::jsonv1::JSON_NORMALISATION_V1,
    digest::SHA256,
    errors::{Error, Result},
    registry::Registries,
    signer::KeyRing,
    signing::{SigningOptions, DEFAULT_TSA_URL},
};

/// Default signing algorithm.
pub const DEFAULT_SIGNING_ALGORITHM: &str = "RSASSA-PKCS1-V1_5";

/// The user-facing signing switches, as they come from a command line or a
/// config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignFlags {
    pub sign_mode: bool,
    #[serde(alias = "signatures")]
    pub signature_names: Vec<String>,
    pub hash: String,
    pub normalization: String,
    pub algorithm: String,
    /// Defaults to `true`, or to `!local` in verify mode
    pub recursive: Option<bool>,
    /// Defaults to the sign mode
    pub update: Option<bool>,
    /// Defaults to the sign mode
    pub verify: Option<bool>,
    pub keyless: bool,
    #[serde(rename = "tsa")]
    pub use_tsa: bool,
    pub tsa_url: Option<String>,
    /// Verify mode only: check the root component version alone
    pub local: bool,
}

impl Default for SignFlags {
    fn default() -> Self {
        Self {
            sign_mode: false,
            signature_names: Vec::new(),
            hash: SHA256.to_owned(),
            normalization: JSON_NORMALISATION_V1.to_owned(),
            algorithm: DEFAULT_SIGNING_ALGORITHM.to_owned(),
            recursive: None,
            update: None,
            verify: None,
            keyless: false,
            use_tsa: false,
            tsa_url: None,
            local: false,
        }
    }
}

impl SignFlags {
    /// Sign mode flags creating the signature `name`.
    pub fn sign(name: impl Into<String>) -> Self {
        Self {
            sign_mode: true,
            signature_names: vec![name.into()],
            ..Self::default()
        }
    }

    /// Verify mode flags checking every signature.
    pub fn verify() -> Self {
        Self::default()
    }

    /// Resolves the flags into signing options.
    ///
    /// Signature names are trimmed and must not be empty. Algorithm names must
    /// be registered. A TSA URL implies TSA usage. Signature verification in
    /// sign mode is switched on by keyless mode or by a public key for the
    /// first signature name.
    pub fn configure(&self, registries: &Registries, keys: KeyRing) -> Result<SigningOptions> {
        let mut names = Vec::with_capacity(self.signature_names.len());
        for (i, n) in self.signature_names.iter().enumerate() {
            let n = n.trim();
            if n.is_empty() {
                return Err(Error::invalid("empty signature name", format!("#{i}")));
            }
            names.push(n.to_owned());
        }

        let algorithms = &registries.algorithms;
        let hash = if self.hash.is_empty() { SHA256 } else { self.hash.as_str() };
        let normalization = if self.normalization.is_empty() {
            JSON_NORMALISATION_V1
        } else {
            self.normalization.as_str()
        };
        algorithms.hasher(hash)?;
        algorithms.normalization(normalization)?;

        let signer = if self.sign_mode {
            let algorithm = if self.algorithm.is_empty() {
                DEFAULT_SIGNING_ALGORITHM
            } else {
                self.algorithm.as_str()
            };
            Some(algorithms.signer(algorithm)?)
        } else {
            None
        };

        let recursively = if self.sign_mode {
            self.recursive.unwrap_or(true)
        } else {
            !self.local
        };

        let verify_signature = match names.first() {
            Some(first) => self.keyless || keys.public_key(first).is_some(),
            None => false,
        };

        let issuer = names
            .first()
            .and_then(|n| keys.issuer(n))
            .or_else(|| keys.issuer(""))
            .map(str::to_owned);

        let opts = SigningOptions {
            sign_mode: self.sign_mode,
            signature_names: names,
            normalization: normalization.to_owned(),
            hasher: hash.to_owned(),
            signer,
            verify: self.verify.unwrap_or(self.sign_mode),
            verify_signature,
            recursively,
            update: self.sign_mode && self.update.unwrap_or(self.sign_mode),
            keyless: self.keyless,
            use_tsa: self.use_tsa || self.tsa_url.is_some(),
            tsa_url: self
                .tsa_url
                .clone()
                .unwrap_or_else(|| DEFAULT_TSA_URL.to_owned()),
            issuer,
            root_certs: keys.root_certs().to_vec(),
            keys: Arc::new(keys),
            ..SigningOptions::verification(KeyRing::new())
        };
        debug!("configured {opts:?}");
        Ok(opts)
    }
}
