use std::{collections::HashMap, future::Future, sync::Arc};

use futures::future::{BoxFuture, FutureExt};
use log::{debug, info, trace, warn};

use crate::{
    access::BlobReference,
    compdesc::{ComponentDescriptor, Signature},
    digest::{blob_digest, compute_digest, Digest},
    errors::{Error, ErrorInfo, ErrorKind, Result, FAILED_BEFORE_FORMATTER, NOT_FOUND_FORMATTER},
    history::{History, NameVersion},
    registry::Registries,
    signer::PublicKey,
    signing::{NodeOutcome, Outcome, Resolver, SigningOptions, SigningReport, Trust},
};

/// Kind used for recursion errors of the component graph.
pub const KIND_COMPONENT_VERSION: &str = "component version";

enum Failure {
    /// Originates at this node and is recorded in the report
    Own(Error),
    /// Caused by a referenced node that recorded it already
    Propagated(Error),
}

impl Failure {
    fn error(&self) -> &Error {
        match self {
            Failure::Own(e) | Failure::Propagated(e) => e,
        }
    }

    fn into_error(self) -> Error {
        match self {
            Failure::Own(e) | Failure::Propagated(e) => e,
        }
    }
}

type NodeResult = std::result::Result<Arc<ComponentDescriptor>, Failure>;

enum Done {
    Completed(Arc<ComponentDescriptor>),
    Failed(ErrorKind),
}

#[derive(Default)]
struct WalkState {
    done: HashMap<NameVersion, Done>,
    outcomes: Vec<NodeOutcome>,
}

impl WalkState {
    fn record_failure(&mut self, history: History, key: NameVersion, err: &Error) {
        warn!("{key}: {err}");
        self.outcomes.push(NodeOutcome {
            history,
            key,
            outcome: Outcome::Failed(err.kind()),
            trust: None,
            digest: None,
            message: Some(err.to_string()),
        });
    }
}

struct Settled {
    outcome: Outcome,
    trust: Option<Trust>,
    digest: Digest,
    signature_added: bool,
}

/// Recursive signing and verification of a component graph.
///
/// Every component version is processed once per run: its history is
/// extended (a cycle is a recursion error), it is resolved, its resource and
/// reference digests are computed or checked, and its signature is created or
/// verified. Completed nodes are persisted through the resolver and are never
/// rolled back when a later node fails.
pub struct SigningPipeline {
    registries: Registries,
    options: SigningOptions,
    resolver: Arc<dyn Resolver>,
}

impl SigningPipeline {
    /// Creates a pipeline after validating `options`.
    ///
    /// # Arguments
    ///
    /// * `registries` - Algorithms and access types used for digests and signatures.
    /// * `options` - Settings of the run.
    /// * `resolver` - Source of component descriptors and blobs.
    ///
    /// # Returns
    ///
    /// The pipeline, or the first invalid or unregistered option.
    pub fn new(
        registries: Registries,
        options: SigningOptions,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self> {
        options.validate(&registries)?;
        Ok(Self {
            registries,
            options,
            resolver,
        })
    }

    /// Settings of the run.
    pub fn options(&self) -> &SigningOptions {
        &self.options
    }

    /// Signs or verifies `root` and, if recursive, its transitive references.
    pub async fn apply(&self, root: &NameVersion) -> SigningReport {
        let mut state = WalkState::default();
        let result = self.walk(&mut state, root.clone(), History::new()).await;

        let digest = state
            .outcomes
            .iter()
            .find(|o| o.history.is_empty() && &o.key == root)
            .and_then(|o| o.digest.clone());
        let error = result.err().map(Failure::into_error);
        SigningReport::new(root.clone(), state.outcomes, digest, error)
    }

    fn walk<'a>(
        &'a self,
        state: &'a mut WalkState,
        nv: NameVersion,
        parent: History,
    ) -> BoxFuture<'a, NodeResult> {
        async move {
            let history = match parent.with(KIND_COMPONENT_VERSION, nv.clone()) {
                Ok(h) => h,
                Err(err) => {
                    state.record_failure(parent, nv, &err);
                    return Err(Failure::Own(err));
                }
            };

            match state.done.get(&nv) {
                Some(Done::Completed(cd)) => {
                    trace!("{nv} already processed");
                    return Ok(cd.clone());
                }
                Some(Done::Failed(kind)) => {
                    let err = ErrorInfo::new(
                        *kind,
                        &FAILED_BEFORE_FORMATTER,
                        KIND_COMPONENT_VERSION,
                        Some(nv.to_string()),
                    );
                    return Err(Failure::Propagated(err.into()));
                }
                None => {}
            }

            let result = self.process(state, &nv, &parent, &history).await;
            match &result {
                Ok(cd) => {
                    state.done.insert(nv, Done::Completed(cd.clone()));
                }
                Err(Failure::Own(err)) => {
                    state.record_failure(parent, nv.clone(), err);
                    state.done.insert(nv, Done::Failed(err.kind()));
                }
                Err(Failure::Propagated(err)) => {
                    state.done.insert(nv, Done::Failed(err.kind()));
                }
            }
            result
        }
        .boxed()
    }

    async fn process(
        &self,
        state: &mut WalkState,
        nv: &NameVersion,
        parent: &History,
        history: &History,
    ) -> NodeResult {
        let opts = &self.options;
        if opts.cancellation.is_cancelled() {
            return Err(Failure::Own(Error::Cancelled {
                element: nv.to_string(),
            }));
        }

        let mut cd = self.resolve(nv).await.map_err(Failure::Own)?;
        debug!("processing {history}");

        let mut changed = false;
        for i in 0..cd.component.resources.len() {
            changed |= self.digest_resource(&mut cd, i).await.map_err(Failure::Own)?;
        }

        let mut failure = None;
        for i in 0..cd.component.component_references.len() {
            let reference = &cd.component.component_references[i];
            let element = format!("reference {} of {nv}", reference.name);
            let recorded = reference.digest.clone();
            let child = reference.name_version();

            if !opts.recursively {
                if recorded.is_none() {
                    return Err(Failure::Own(Error::not_found("digest of", element)));
                }
                trace!("trusting recorded digest of {element}");
                continue;
            }

            let child_cd = match self.walk(state, child, history.clone()).await {
                Ok(cd) => cd,
                Err(f) => {
                    let cancelled = f.error().is(ErrorKind::Cancelled);
                    let err = Error::wrap(element, f.into_error());
                    if opts.aggregate && !cancelled {
                        failure.get_or_insert(err);
                        continue;
                    }
                    return Err(Failure::Propagated(err));
                }
            };
            let computed = self
                .descriptor_digest(&child_cd, recorded.as_ref())
                .map_err(Failure::Own)?;
            if let Some(d) = self
                .reconcile(&element, recorded.as_ref(), computed)
                .map_err(Failure::Own)?
            {
                cd.component.component_references[i].digest = Some(d);
                changed = true;
            }
        }
        if let Some(err) = failure {
            return Err(Failure::Propagated(err));
        }

        let settled = if opts.sign_mode {
            self.sign(&mut cd, nv).await
        } else {
            self.verify(&cd, nv, parent.is_empty()).await
        }
        .map_err(Failure::Own)?;

        if opts.sign_mode && (changed || settled.signature_added) {
            debug!("storing {nv}");
            self.call_resolver(nv, "update", self.resolver.update(&cd))
                .await
                .map_err(Failure::Own)?;
        }

        info!("{history}: {}", settled.outcome);
        state.outcomes.push(NodeOutcome {
            history: parent.clone(),
            key: nv.clone(),
            outcome: settled.outcome,
            trust: settled.trust,
            digest: Some(settled.digest),
            message: None,
        });
        Ok(Arc::new(cd))
    }

    async fn call_resolver<T>(
        &self,
        nv: &NameVersion,
        operation: &str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        let timeout = self.options.resolve_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::resolution_failed(
                nv,
                format!("{operation} failed"),
                Some(e.into()),
            )),
            Err(_) => Err(Error::resolution_failed(
                nv,
                format!("{operation} timed out after {timeout:?}"),
                None,
            )),
        }
    }

    async fn resolve(&self, nv: &NameVersion) -> Result<ComponentDescriptor> {
        self.call_resolver(nv, "lookup", self.resolver.lookup(nv))
            .await?
            .ok_or_else(|| Error::resolution_failed(nv, "not found", None))
    }

    async fn fetch(
        &self,
        owner: &NameVersion,
        reference: &BlobReference,
        element: &str,
    ) -> Result<Vec<u8>> {
        self.call_resolver(owner, "blob fetch", self.resolver.fetch_blob(owner, reference))
            .await?
            .ok_or_else(|| Error::resolution_failed(element, "blob not found", None))
    }

    /// Computes or checks the digest of resource `i`. Returns whether the
    /// descriptor changed.
    async fn digest_resource(&self, cd: &mut ComponentDescriptor, i: usize) -> Result<bool> {
        let opts = &self.options;
        let owner = cd.name_version();
        let resource = &cd.component.resources[i];
        let element = format!("resource {} of {owner}", resource.name);
        let recorded = resource.digest.clone();
        let access = self
            .registries
            .access_types
            .decode_value(&resource.access)
            .map_err(|e| Error::wrap(element.clone(), e))?;

        let reference = access.blob_reference();
        match &reference {
            BlobReference::None => return Ok(false),
            BlobReference::Remote { locator } if recorded.is_some() => {
                trace!("trusting recorded digest of {element} at {locator}");
                return Ok(false);
            }
            BlobReference::Remote { .. } if !opts.sign_mode => {
                return Err(Error::not_found("digest of", element));
            }
            _ => {}
        }

        let data = self.fetch(&owner, &reference, &element).await?;
        let hash = recorded
            .as_ref()
            .map_or(opts.hasher.as_str(), |d| d.hash_algorithm.as_str());
        let computed = blob_digest(&self.registries.algorithms, &data, hash)?;
        match self.reconcile(&element, recorded.as_ref(), computed)? {
            Some(d) => {
                cd.component.resources[i].digest = Some(d);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Digest of a descriptor with the recorded algorithms, or the configured
    /// ones if nothing is recorded.
    fn descriptor_digest(
        &self,
        cd: &ComponentDescriptor,
        recorded: Option<&Digest>,
    ) -> Result<Digest> {
        let (norm, hash) = match recorded {
            Some(d) => (d.normalisation_algorithm.as_str(), d.hash_algorithm.as_str()),
            None => (
                self.options.normalization.as_str(),
                self.options.hasher.as_str(),
            ),
        };
        compute_digest(&self.registries.algorithms, cd, norm, hash)
    }

    /// Compares a computed digest with the recorded one and returns the
    /// digest to write back, if any.
    fn reconcile(
        &self,
        element: &str,
        recorded: Option<&Digest>,
        computed: Digest,
    ) -> Result<Option<Digest>> {
        let opts = &self.options;
        match recorded {
            None if opts.sign_mode => Ok(Some(computed)),
            None => Err(Error::not_found("digest of", element)),
            Some(r) if *r == computed => Ok(None),
            Some(_) if opts.sign_mode && opts.update => {
                debug!("updating digest of {element}");
                Ok(Some(computed))
            }
            Some(r) if opts.sign_mode && !opts.verify => {
                warn!("keeping recorded digest {r} of {element}");
                Ok(None)
            }
            Some(r) => Err(Error::digest_mismatch(element, r, &computed)),
        }
    }

    fn check_signature_digest(
        &self,
        cd: &ComponentDescriptor,
        nv: &NameVersion,
        sig: &Signature,
    ) -> Result<()> {
        let computed = self.descriptor_digest(cd, Some(&sig.digest))?;
        if computed != sig.digest {
            return Err(Error::digest_mismatch(
                format!("signature {} of {nv}", sig.name),
                &sig.digest,
                &computed,
            ));
        }
        Ok(())
    }

    fn verify_with_key(&self, nv: &NameVersion, sig: &Signature, key: &PublicKey) -> Result<()> {
        let verifier = self
            .registries
            .algorithms
            .verifier(&sig.signature.algorithm)?;
        verifier
            .verify(&sig.digest, &sig.signature, key)
            .map_err(|e| Error::VerificationFailed {
                element: nv.to_string(),
                name: sig.name.clone(),
                reason: e.to_string(),
                source: Some(e.into()),
            })
    }

    async fn verify_keyless(&self, nv: &NameVersion, sig: &Signature) -> Result<()> {
        let opts = &self.options;
        let provider = opts
            .keyless_provider
            .as_ref()
            .ok_or_else(|| Error::not_found("keyless provider", &sig.name))?;
        provider
            .verify(&sig.digest, &sig.signature, &opts.root_certs)
            .await
            .map_err(|e| Error::VerificationFailed {
                element: nv.to_string(),
                name: sig.name.clone(),
                reason: e.to_string(),
                source: Some(e.into()),
            })
    }

    async fn attach_timestamp(&self, sig: &mut Signature) -> Result<()> {
        let opts = &self.options;
        if !opts.use_tsa {
            return Ok(());
        }
        let tsa = opts
            .tsa
            .as_ref()
            .ok_or_else(|| Error::not_found("timestamp authority", &opts.tsa_url))?;
        let ts = tsa
            .timestamp(&opts.tsa_url, &sig.digest)
            .await
            .map_err(|e| Error::wrap(format!("timestamp from {}", opts.tsa_url), e))?;
        sig.timestamp = Some(ts);
        Ok(())
    }

    async fn sign(&self, cd: &mut ComponentDescriptor, nv: &NameVersion) -> Result<Settled> {
        let opts = &self.options;
        let name = opts
            .primary_name()
            .ok_or_else(|| Error::not_found("signature name", nv.to_string()))?;
        let digest = compute_digest(
            &self.registries.algorithms,
            cd,
            &opts.normalization,
            &opts.hasher,
        )?;
        let existing = cd.signature(name).cloned();
        if let Some(sig) = existing.as_ref().filter(|_| !opts.update) {
            // A stale signature is only replaced when updating.
            self.check_signature_digest(cd, nv, sig)?;
        }

        let settled = match existing {
            Some(sig) if opts.keyless => {
                self.check_signature_digest(cd, nv, &sig)?;
                self.verify_keyless(nv, &sig).await?;
                Settled {
                    outcome: Outcome::Verified,
                    trust: Some(Trust::External),
                    digest: sig.digest,
                    signature_added: false,
                }
            }
            Some(sig) if opts.verify_signature => {
                self.check_signature_digest(cd, nv, &sig)?;
                let key = opts.keys.verification_key(name).ok_or_else(|| {
                    Error::verification_failed(nv, name, "no public key configured")
                })?;
                self.verify_with_key(nv, &sig, &key)?;
                Settled {
                    outcome: Outcome::Verified,
                    trust: Some(Trust::Key),
                    digest: sig.digest,
                    signature_added: false,
                }
            }
            _ => {
                let (spec, trust) = if opts.keyless {
                    let provider = opts
                        .keyless_provider
                        .as_ref()
                        .ok_or_else(|| Error::not_found("keyless provider", name))?;
                    let spec = provider
                        .sign(&digest)
                        .await
                        .map_err(|e| Error::wrap(format!("keyless signing of {nv}"), e))?;
                    (spec, Trust::External)
                } else {
                    let key = opts
                        .keys
                        .private_key(name)
                        .ok_or_else(|| Error::not_found("private key for signature", name))?;
                    let signer = opts
                        .signer
                        .as_ref()
                        .ok_or_else(|| Error::not_found("signing algorithm", name))?;
                    let issuer = opts.issuer.as_deref().or_else(|| opts.keys.issuer(name));
                    let spec = signer
                        .sign(&digest, key, issuer)
                        .await
                        .map_err(|e| Error::wrap(format!("signing {nv} as {name}"), e))?;
                    (spec, Trust::Key)
                };
                let mut sig = Signature {
                    name: name.to_owned(),
                    digest: digest.clone(),
                    signature: spec,
                    timestamp: None,
                };
                self.attach_timestamp(&mut sig).await?;
                cd.set_signature(sig);
                Settled {
                    outcome: Outcome::Signed,
                    trust: Some(trust),
                    digest,
                    signature_added: true,
                }
            }
        };

        if opts.verify {
            for sig in cd.signatures.iter().filter(|s| s.name != name) {
                self.check_signature_digest(cd, nv, sig)?;
            }
        }
        Ok(settled)
    }

    async fn verify(
        &self,
        cd: &ComponentDescriptor,
        nv: &NameVersion,
        is_root: bool,
    ) -> Result<Settled> {
        let opts = &self.options;
        let names: Vec<&str> = if opts.signature_names.is_empty() {
            cd.signatures.iter().map(|s| s.name.as_str()).collect()
        } else {
            opts.signature_names.iter().map(String::as_str).collect()
        };
        if names.is_empty() && is_root {
            return Err(ErrorInfo::new(
                ErrorKind::NotFound,
                &NOT_FOUND_FORMATTER,
                "signature",
                None,
            )
            .with_context(nv.to_string())
            .into());
        }

        let mut verified: Option<(Digest, Trust)> = None;
        for name in names {
            let Some(sig) = cd.signature(name) else {
                if is_root {
                    return Err(ErrorInfo::new(
                        ErrorKind::NotFound,
                        &NOT_FOUND_FORMATTER,
                        "signature",
                        Some(name.to_owned()),
                    )
                    .with_context(nv.to_string())
                    .into());
                }
                continue;
            };
            self.check_signature_digest(cd, nv, sig)?;
            let trust = if opts.keyless {
                self.verify_keyless(nv, sig).await?;
                Trust::External
            } else {
                let key = opts.keys.verification_key(name).ok_or_else(|| {
                    Error::verification_failed(nv, name, "no public key configured")
                })?;
                self.verify_with_key(nv, sig, &key)?;
                Trust::Key
            };
            debug!("signature {name} of {nv} verified");
            verified.get_or_insert((sig.digest.clone(), trust));
        }

        match verified {
            Some((digest, trust)) => Ok(Settled {
                outcome: Outcome::Verified,
                trust: Some(trust),
                digest,
                signature_added: false,
            }),
            None => Ok(Settled {
                outcome: Outcome::Digested,
                trust: None,
                digest: self.descriptor_digest(cd, None)?,
                signature_added: false,
            }),
        }
    }
}
