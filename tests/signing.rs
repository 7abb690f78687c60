#![cfg(feature = "signer-ed25519")]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{bail, Result as AnyResult};
use async_trait::async_trait;
use component_integrity::{
    access::{AccessSpec, BlobReference, LocalBlobAccess},
    blob_store::InMemoryStore,
    compdesc::{
        jsonv1::JSON_NORMALISATION_V1, ComponentDescriptor, ComponentReference, Label, Relation,
        Resource, SignatureSpec, TimestampSpec,
    },
    digest::{compute_digest, Digest, SHA256},
    errors::find_recursion,
    registry::{default_algorithms, Registries},
    signer::{Ed25519Signer, KeyRing, KeyType, PrivateKey},
    signing::{
        CancellationToken, InMemoryRepository, KeylessProvider, Outcome, Resolver,
        SigningOptions, SigningPipeline, SigningReport, TimestampAuthority, Trust,
    },
    ErrorKind, NameVersion,
};

const SIGNATURE: &str = "release";

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn nv(name: &str) -> NameVersion {
    NameVersion::new(format!("acme.org/{name}"), "1.0.0")
}

/// Stores one descriptor per `(name, references)` entry, each with a local
/// blob resource.
async fn repository(graph: &[(&str, &[&str])]) -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new(Arc::new(InMemoryStore::new())));
    for (name, refs) in graph {
        let mut cd = ComponentDescriptor::new(format!("acme.org/{name}"), "1.0.0", "acme");
        let blob = format!("content of {name}").into_bytes();
        let digest = repo.add_local_blob(blob).await.unwrap();
        let access = AccessSpec::from(LocalBlobAccess::new(digest, "text/plain"));
        cd.component.resources.push(Resource {
            name: "data".into(),
            version: "1.0.0".into(),
            resource_type: "plainText".into(),
            relation: Relation::Local,
            extra_identity: BTreeMap::new(),
            labels: Vec::new(),
            access: access.to_value().unwrap(),
            digest: None,
        });
        for r in refs.iter() {
            cd.component.component_references.push(ComponentReference::new(
                *r,
                format!("acme.org/{r}"),
                "1.0.0",
            ));
        }
        repo.add(cd).unwrap();
    }
    repo
}

fn signing_options(key: &PrivateKey) -> SigningOptions {
    let keys = KeyRing::new().with_private_key(SIGNATURE, key.clone());
    SigningOptions::signing(SIGNATURE, Arc::new(Ed25519Signer), keys)
}

fn verification_options(key: &PrivateKey) -> SigningOptions {
    let keys = KeyRing::new().with_public_key(SIGNATURE, key.public_key());
    SigningOptions::verification(keys)
}

async fn run(
    options: SigningOptions,
    resolver: Arc<dyn Resolver>,
    root: &str,
) -> SigningReport {
    SigningPipeline::new(Registries::default(), options, resolver)
        .unwrap()
        .apply(&nv(root))
        .await
}

fn v1_digest(cd: &ComponentDescriptor) -> Digest {
    compute_digest(&default_algorithms(), cd, JSON_NORMALISATION_V1, SHA256).unwrap()
}

/// Delegates to a repository, counting lookups and running a hook before
/// each lookup.
struct Instrumented {
    inner: Arc<InMemoryRepository>,
    lookups: Mutex<HashMap<NameVersion, usize>>,
    on_lookup: Box<dyn Fn(&NameVersion) + Send + Sync>,
    delay: Option<(NameVersion, Duration)>,
}

impl Instrumented {
    fn new(inner: Arc<InMemoryRepository>) -> Self {
        Self {
            inner,
            lookups: Mutex::new(HashMap::new()),
            on_lookup: Box::new(|_: &NameVersion| {}),
            delay: None,
        }
    }

    fn lookups(&self, nv: &NameVersion) -> usize {
        self.lookups.lock().unwrap().get(nv).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Resolver for Instrumented {
    async fn lookup(&self, nv: &NameVersion) -> AnyResult<Option<ComponentDescriptor>> {
        *self.lookups.lock().unwrap().entry(nv.clone()).or_default() += 1;
        (self.on_lookup)(nv);
        if let Some((slow, delay)) = &self.delay {
            if slow == nv {
                tokio::time::sleep(*delay).await;
            }
        }
        self.inner.lookup(nv).await
    }

    async fn fetch_blob(
        &self,
        owner: &NameVersion,
        reference: &BlobReference,
    ) -> AnyResult<Option<Vec<u8>>> {
        self.inner.fetch_blob(owner, reference).await
    }

    async fn update(&self, cd: &ComponentDescriptor) -> AnyResult<()> {
        self.inner.update(cd).await
    }
}

#[tokio::test]
async fn sign_and_verify_diamond() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[
        ("a", &["b", "c"]),
        ("b", &["d"]),
        ("c", &["d"]),
        ("d", &[]),
    ])
    .await;
    let resolver = Arc::new(Instrumented::new(repo.clone()));

    let report = run(signing_options(&key), resolver.clone(), "a").await;
    assert!(report.is_success(), "{}", report.render());
    assert_eq!(report.outcomes.len(), 4);
    assert!(report.outcomes.iter().all(|o| o.outcome == Outcome::Signed));
    assert_eq!(resolver.lookups(&nv("d")), 1);

    let a = repo.get(&nv("a")).unwrap();
    let d = repo.get(&nv("d")).unwrap();
    assert!(a.component.resources[0].digest.is_some());
    assert!(a
        .component
        .component_references
        .iter()
        .all(|r| r.digest.is_some()));
    assert_eq!(a.signature(SIGNATURE).unwrap().digest, v1_digest(&a));
    assert!(d.signature(SIGNATURE).is_some());
    assert_eq!(report.into_result().unwrap(), v1_digest(&a));

    let report = run(verification_options(&key), repo.clone(), "a").await;
    assert!(report.is_success(), "{}", report.render());
    let root = report.outcome(&nv("a")).unwrap();
    assert_eq!(root.outcome, Outcome::Verified);
    assert_eq!(root.trust, Some(Trust::Key));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn cycle_is_reported_with_its_path() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[("a", &["b"]), ("b", &["a"])]).await;

    let report = run(signing_options(&key), repo.clone(), "a").await;
    assert_eq!(report.exit_code(), 1);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].key, nv("a"));
    assert_eq!(failures[0].outcome, Outcome::Failed(ErrorKind::Recursion));
    assert_eq!(
        failures[0].path(),
        "acme.org/a:1.0.0->acme.org/b:1.0.0->acme.org/a:1.0.0"
    );

    let err = report.error.as_ref().unwrap();
    assert_eq!(err.kind(), ErrorKind::Recursion);
    let recursion = find_recursion(err).unwrap();
    assert_eq!(recursion.element(), &nv("a"));
    assert_eq!(recursion.history().to_vec(), vec![nv("a"), nv("b")]);

    assert!(repo.get(&nv("a")).unwrap().signatures.is_empty());
}

#[tokio::test]
async fn wrong_key_fails_verification() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let other = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[("a", &[])]).await;

    assert!(run(signing_options(&key), repo.clone(), "a").await.is_success());

    let report = run(verification_options(&other), repo.clone(), "a").await;
    let failure = report.outcome(&nv("a")).unwrap();
    assert_eq!(
        failure.outcome,
        Outcome::Failed(ErrorKind::VerificationFailed)
    );
    assert!(report
        .render()
        .starts_with("acme.org/a:1.0.0: verification-failed: "));
    assert_eq!(
        report.into_result().unwrap_err().kind(),
        ErrorKind::VerificationFailed
    );
}

#[tokio::test]
async fn missing_root_signature_is_not_found() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[("a", &[])]).await;

    let report = run(verification_options(&key), repo, "a").await;
    assert_eq!(report.error.unwrap().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn unsigned_reference_is_digested() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[("a", &["b"]), ("b", &[])]).await;
    assert!(run(signing_options(&key), repo.clone(), "a").await.is_success());

    let mut b = repo.get(&nv("b")).unwrap();
    b.signatures.clear();
    repo.add(b).unwrap();

    let opts = verification_options(&key).with_signature_names(vec![SIGNATURE.into()]);
    let report = run(opts, repo, "a").await;
    assert!(report.is_success(), "{}", report.render());
    assert_eq!(report.outcome(&nv("b")).unwrap().outcome, Outcome::Digested);
    assert_eq!(report.outcome(&nv("a")).unwrap().outcome, Outcome::Verified);
}

#[tokio::test]
async fn stale_reference_digest_needs_update() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[("a", &["b"]), ("b", &[])]).await;
    assert!(run(signing_options(&key), repo.clone(), "a").await.is_success());

    let mut b = repo.get(&nv("b")).unwrap();
    b.component.provider = "someone else".into();
    repo.add(b).unwrap();
    let before = repo.get(&nv("a")).unwrap();

    let report = run(signing_options(&key).with_update(false), repo.clone(), "a").await;
    let failure = report.outcome(&nv("a")).unwrap();
    assert_eq!(failure.outcome, Outcome::Failed(ErrorKind::DigestMismatch));
    assert_eq!(repo.get(&nv("a")).unwrap(), before);

    let report = run(signing_options(&key).with_update(true), repo.clone(), "a").await;
    assert!(report.is_success(), "{}", report.render());
    let a = repo.get(&nv("a")).unwrap();
    let b = repo.get(&nv("b")).unwrap();
    assert_eq!(
        a.component.component_references[0].digest,
        Some(v1_digest(&b))
    );

    let report = run(verification_options(&key), repo, "a").await;
    assert!(report.is_success(), "{}", report.render());
}

#[tokio::test]
async fn stale_signature_is_kept_without_update() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[("a", &[])]).await;
    assert!(run(signing_options(&key), repo.clone(), "a").await.is_success());

    let mut a = repo.get(&nv("a")).unwrap();
    let signed = a.signature(SIGNATURE).unwrap().digest.clone();
    a.component.labels.push(Label::new("stage", "qa"));
    repo.add(a).unwrap();
    let before = repo.get(&nv("a")).unwrap();

    let report = run(signing_options(&key).with_update(false), repo.clone(), "a").await;
    assert_eq!(
        report.outcome(&nv("a")).unwrap().outcome,
        Outcome::Failed(ErrorKind::DigestMismatch)
    );
    assert_eq!(repo.get(&nv("a")).unwrap(), before);

    let report = run(signing_options(&key), repo.clone(), "a").await;
    assert!(report.is_success(), "{}", report.render());
    let a = repo.get(&nv("a")).unwrap();
    let resigned = &a.signature(SIGNATURE).unwrap().digest;
    assert_ne!(resigned, &signed);
    assert_eq!(resigned, &v1_digest(&a));
}

#[tokio::test]
async fn local_run_trusts_recorded_reference_digests() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[("a", &["b"]), ("b", &[])]).await;

    let resolver = Arc::new(Instrumented::new(repo.clone()));
    let opts = signing_options(&key).with_recursively(false);
    let report = run(opts, resolver.clone(), "a").await;
    let failure = report.outcome(&nv("a")).unwrap();
    assert_eq!(failure.outcome, Outcome::Failed(ErrorKind::NotFound));
    assert_eq!(resolver.lookups(&nv("b")), 0);
    assert!(repo.get(&nv("a")).unwrap().signatures.is_empty());

    assert!(run(signing_options(&key), repo.clone(), "a").await.is_success());
    let mut b = repo.get(&nv("b")).unwrap();
    b.component.provider = "someone else".into();
    repo.add(b).unwrap();

    let resolver = Arc::new(Instrumented::new(repo.clone()));
    let opts = verification_options(&key).with_recursively(false);
    let report = run(opts, resolver.clone(), "a").await;
    assert!(report.is_success(), "{}", report.render());
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcome(&nv("a")).unwrap().outcome, Outcome::Verified);
    assert_eq!(resolver.lookups(&nv("a")), 1);
    assert_eq!(resolver.lookups(&nv("b")), 0);
}

#[tokio::test]
async fn aggregate_reports_every_failing_reference() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[("a", &["c", "b"])]).await;

    let report = run(signing_options(&key), repo.clone(), "a").await;
    assert_eq!(report.failures().count(), 1);

    let report = run(signing_options(&key).with_aggregate(true), repo, "a").await;
    let failing: Vec<_> = report.failures().map(|o| o.key.clone()).collect();
    assert_eq!(failing, vec![nv("b"), nv("c")]);
    assert!(report
        .failures()
        .all(|o| o.outcome == Outcome::Failed(ErrorKind::ResolutionFailed)));
    assert_eq!(
        report.render().lines().next().unwrap(),
        "acme.org/a:1.0.0->acme.org/b:1.0.0: resolution-failed: \
         cannot resolve acme.org/b:1.0.0: not found"
    );
    assert_eq!(report.error.unwrap().kind(), ErrorKind::ResolutionFailed);
}

#[tokio::test]
async fn cancellation_keeps_completed_nodes() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[
        ("a", &["x", "b"]),
        ("x", &[]),
        ("b", &["c"]),
        ("c", &[]),
    ])
    .await;

    let token = CancellationToken::new();
    let trigger = token.clone();
    let mut resolver = Instrumented::new(repo.clone());
    resolver.on_lookup = Box::new(move |nv: &NameVersion| {
        if nv.name() == "acme.org/b" {
            trigger.cancel();
        }
    });
    let resolver = Arc::new(resolver);

    let opts = signing_options(&key).with_cancellation(token);
    let report = run(opts, resolver.clone(), "a").await;

    assert_eq!(report.error.as_ref().unwrap().kind(), ErrorKind::Cancelled);
    assert_eq!(
        report.outcome(&nv("c")).unwrap().outcome,
        Outcome::Failed(ErrorKind::Cancelled)
    );
    assert_eq!(resolver.lookups(&nv("c")), 0);
    assert!(repo.get(&nv("x")).unwrap().signature(SIGNATURE).is_some());
    assert!(repo.get(&nv("a")).unwrap().signatures.is_empty());
}

#[tokio::test]
async fn slow_resolver_times_out() {
    init_logger();
    let key = PrivateKey::generate(KeyType::Ed25519).unwrap();
    let repo = repository(&[("a", &["b"]), ("b", &[])]).await;
    let mut resolver = Instrumented::new(repo);
    resolver.delay = Some((nv("b"), Duration::from_millis(500)));

    let opts = signing_options(&key).with_resolve_timeout(Duration::from_millis(20));
    let report = run(opts, Arc::new(resolver), "a").await;

    let failure = report.outcome(&nv("b")).unwrap();
    assert_eq!(
        failure.outcome,
        Outcome::Failed(ErrorKind::ResolutionFailed)
    );
    assert!(failure.message.as_ref().unwrap().contains("timed out"));
}

struct FakeKeyless;

#[async_trait]
impl KeylessProvider for FakeKeyless {
    async fn sign(&self, digest: &Digest) -> AnyResult<SignatureSpec> {
        Ok(SignatureSpec {
            algorithm: "keyless".into(),
            value: digest.value.chars().rev().collect(),
            media_type: "application/vnd.dev.sigstore.bundle".into(),
            issuer: Some("ci@acme.org".into()),
        })
    }

    async fn verify(
        &self,
        digest: &Digest,
        signature: &SignatureSpec,
        _root_certs: &[String],
    ) -> AnyResult<()> {
        let expected: String = digest.value.chars().rev().collect();
        if signature.value != expected {
            bail!("certificate does not match");
        }
        Ok(())
    }
}

struct FakeTsa;

#[async_trait]
impl TimestampAuthority for FakeTsa {
    async fn timestamp(&self, url: &str, digest: &Digest) -> AnyResult<TimestampSpec> {
        let token = format!("{url}#{}", digest.value);
        Ok(TimestampSpec::new(token.as_bytes(), chrono::Utc::now()))
    }
}

#[tokio::test]
async fn keyless_signing_with_timestamp() {
    init_logger();
    let repo = repository(&[("a", &[])]).await;

    let mut opts = SigningOptions::verification(KeyRing::new())
        .with_signature_names(vec![SIGNATURE.into()])
        .with_keyless(Arc::new(FakeKeyless))
        .with_tsa(Arc::new(FakeTsa));
    opts.sign_mode = true;
    opts.update = true;

    let report = run(opts.clone(), repo.clone(), "a").await;
    assert!(report.is_success(), "{}", report.render());
    let root = report.outcome(&nv("a")).unwrap();
    assert_eq!(root.outcome, Outcome::Signed);
    assert_eq!(root.trust, Some(Trust::External));

    let a = repo.get(&nv("a")).unwrap();
    let sig = a.signature(SIGNATURE).unwrap();
    assert_eq!(sig.signature.issuer.as_deref(), Some("ci@acme.org"));
    let token = sig.timestamp.as_ref().unwrap().token().unwrap();
    assert!(token.starts_with(b"http://timestamp.digicert.com#"));

    let report = run(opts, repo.clone(), "a").await;
    assert_eq!(
        report.outcome(&nv("a")).unwrap().outcome,
        Outcome::Verified
    );

    let verify = SigningOptions::verification(KeyRing::new()).with_keyless(Arc::new(FakeKeyless));
    let report = run(verify, repo, "a").await;
    assert!(report.is_success(), "{}", report.render());
    assert_eq!(report.outcome(&nv("a")).unwrap().trust, Some(Trust::External));
}
