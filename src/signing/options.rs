use std::{fmt, sync::Arc, time::Duration};

use crate::{
    compdesc::jsonv1::JSON_NORMALISATION_V1,
    digest::SHA256,
    errors::{Error, Result},
    registry::Registries,
    signer::{KeyRing, Signer},
    signing::{CancellationToken, KeylessProvider, TimestampAuthority, DEFAULT_TSA_URL},
};

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings of one signing or verification run.
///
/// Built by the caller (usually through [`SignFlags`](super::SignFlags)) and
/// owned by the pipeline for the duration of the run.
#[derive(Clone)]
pub struct SigningOptions {
    /// Sign (`true`) or only verify (`false`)
    pub sign_mode: bool,
    /// Signatures to handle; only the first one is created when signing
    pub signature_names: Vec<String>,
    pub normalization: String,
    pub hasher: String,
    /// Handler creating signatures, required in sign mode without keyless
    pub signer: Option<Arc<dyn Signer>>,
    /// Check recorded digests instead of trusting them
    pub verify: bool,
    /// In sign mode, verify an existing signature instead of re-signing
    pub verify_signature: bool,
    pub recursively: bool,
    /// Write recomputed digests back over stale ones
    pub update: bool,
    pub keyless: bool,
    pub use_tsa: bool,
    pub tsa_url: String,
    pub keys: Arc<KeyRing>,
    pub issuer: Option<String>,
    pub root_certs: Vec<String>,
    pub tsa: Option<Arc<dyn TimestampAuthority>>,
    pub keyless_provider: Option<Arc<dyn KeylessProvider>>,
    pub cancellation: CancellationToken,
    pub resolve_timeout: Duration,
    /// Continue with sibling references after a failure and report all
    pub aggregate: bool,
}

impl SigningOptions {
    /// Sign mode defaults: verify and update digests, recurse.
    pub fn signing(name: impl Into<String>, signer: Arc<dyn Signer>, keys: KeyRing) -> Self {
        Self {
            sign_mode: true,
            signature_names: vec![name.into()],
            signer: Some(signer),
            verify: true,
            update: true,
            ..Self::verification(keys)
        }
    }

    /// Verify mode defaults: all signatures, recurse.
    pub fn verification(keys: KeyRing) -> Self {
        Self {
            sign_mode: false,
            signature_names: Vec::new(),
            normalization: JSON_NORMALISATION_V1.to_owned(),
            hasher: SHA256.to_owned(),
            signer: None,
            verify: true,
            verify_signature: false,
            recursively: true,
            update: false,
            keyless: false,
            use_tsa: false,
            tsa_url: DEFAULT_TSA_URL.to_owned(),
            root_certs: keys.root_certs().to_vec(),
            keys: Arc::new(keys),
            issuer: None,
            tsa: None,
            keyless_provider: None,
            cancellation: CancellationToken::new(),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            aggregate: false,
        }
    }

    /// Write recomputed digests over stale ones and replace stale
    /// signatures. Without it a stale digest is a digest mismatch.
    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Walk referenced component versions. When off, recorded reference
    /// digests are trusted and the references are never resolved.
    pub fn with_recursively(mut self, recursively: bool) -> Self {
        self.recursively = recursively;
        self
    }

    /// Selects the normalisation and hash algorithm for new digests.
    ///
    /// # Arguments
    ///
    /// * `normalization` - Registered normalisation name, e.g. `jsonNormalisation/v2`.
    /// * `hasher` - Registered hash algorithm name, e.g. `SHA-512`.
    pub fn with_algorithms(
        mut self,
        normalization: impl Into<String>,
        hasher: impl Into<String>,
    ) -> Self {
        self.normalization = normalization.into();
        self.hasher = hasher.into();
        self
    }

    /// Replaces the signatures to handle; the first is the one created.
    pub fn with_signature_names(mut self, names: Vec<String>) -> Self {
        self.signature_names = names;
        self
    }

    /// Issuer recorded in created signatures, overriding the key ring.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Timestamps every created signature through `tsa`.
    pub fn with_tsa(mut self, tsa: Arc<dyn TimestampAuthority>) -> Self {
        self.use_tsa = true;
        self.tsa = Some(tsa);
        self
    }

    /// Signs and verifies through `provider` instead of local keys.
    pub fn with_keyless(mut self, provider: Arc<dyn KeylessProvider>) -> Self {
        self.keyless = true;
        self.verify_signature = true;
        self.keyless_provider = Some(provider);
        self
    }

    /// Token observed before each component version is resolved.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Upper bound for each resolver call.
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Keep processing sibling references after one fails.
    pub fn with_aggregate(mut self, aggregate: bool) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// The signature created in sign mode.
    pub fn primary_name(&self) -> Option<&str> {
        self.signature_names.first().map(String::as_str)
    }

    /// Checks the options are complete and every algorithm is registered.
    pub fn validate(&self, registries: &Registries) -> Result<()> {
        registries.algorithms.normalization(&self.normalization)?;
        registries.algorithms.hasher(&self.hasher)?;
        if self.keyless && self.keyless_provider.is_none() {
            return Err(Error::not_found("keyless provider", "keyless signing"));
        }
        if !self.sign_mode {
            return Ok(());
        }
        if self.primary_name().is_none() {
            return Err(Error::not_found("signature name", "signing"));
        }
        if !self.keyless && self.signer.is_none() {
            return Err(Error::not_found("signing algorithm", "signing"));
        }
        if self.use_tsa && self.tsa.is_none() {
            return Err(Error::not_found("timestamp authority", &self.tsa_url));
        }
        Ok(())
    }
}

impl fmt::Debug for SigningOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningOptions")
            .field("sign_mode", &self.sign_mode)
            .field("signature_names", &self.signature_names)
            .field("normalization", &self.normalization)
            .field("hasher", &self.hasher)
            .field("signer", &self.signer.as_ref().map(|s| s.algorithm().to_owned()))
            .field("verify", &self.verify)
            .field("verify_signature", &self.verify_signature)
            .field("recursively", &self.recursively)
            .field("update", &self.update)
            .field("keyless", &self.keyless)
            .field("use_tsa", &self.use_tsa)
            .field("tsa_url", &self.tsa_url)
            .field("issuer", &self.issuer)
            .field("resolve_timeout", &self.resolve_timeout)
            .field("aggregate", &self.aggregate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn verification_defaults() {
        let opts = SigningOptions::verification(KeyRing::new());
        assert!(!opts.sign_mode);
        assert!(opts.recursively);
        assert_eq!(opts.hasher, "SHA-256");
        assert_eq!(opts.normalization, "jsonNormalisation/v1");
        assert!(opts.validate(&Registries::default()).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_hash() {
        let opts = SigningOptions::verification(KeyRing::new()).with_algorithms(
            JSON_NORMALISATION_V1,
            "MD5",
        );
        let err = opts.validate(&Registries::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[cfg(feature = "signer-ed25519")]
    #[test]
    fn validate_sign_mode_requirements() {
        let registries = Registries::default();
        let opts = SigningOptions::signing(
            "release",
            Arc::new(crate::signer::Ed25519Signer),
            KeyRing::new(),
        );
        assert!(opts.validate(&registries).is_ok());

        let unnamed = opts.clone().with_signature_names(vec![]);
        assert_eq!(
            unnamed.validate(&registries).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let mut tsa = opts;
        tsa.use_tsa = true;
        assert_eq!(tsa.validate(&registries).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
