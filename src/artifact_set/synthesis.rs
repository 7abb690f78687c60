use std::{
    collections::HashSet,
    fs,
    io::Write,
    path::Path,
};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use log::{debug, trace};
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::{
    artifact_set::{ArtifactSet, ARCHIVE_MEDIA_SUFFIX, MAIN_ARTIFACT_ANNOTATION},
    digest::oci::{self, oci_digest},
    errors::{Error, Result},
};

/// An artifact as delivered by a [`Namespace`]: its manifest and the media
/// type of that manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub media_type: String,
    pub manifest: Vec<u8>,
}

impl Artifact {
    /// Creates an artifact from its manifest bytes.
    pub fn new(media_type: impl Into<String>, manifest: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            manifest,
        }
    }

    /// OCI digest of the manifest.
    pub fn digest(&self) -> String {
        oci_digest(&self.manifest)
    }
}

/// Source of artifacts and blobs for synthesis, e.g. one repository of an
/// OCI registry.
#[async_trait]
pub trait Namespace: Send + Sync {
    /// Resolves a tag or digest reference.
    async fn get_artifact(&self, reference: &str) -> AnyResult<Artifact>;

    async fn get_blob(&self, digest: &str) -> AnyResult<Vec<u8>>;

    /// References of artifacts associated with `digest` by convention, such
    /// as signatures stored under a derived tag.
    async fn side_artifacts(&self, _digest: &str) -> AnyResult<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Default, Deserialize)]
struct Descriptor {
    digest: String,
}

/// The parts of an image manifest or index that reference content.
#[derive(Debug, Default, Deserialize)]
struct ManifestLinks {
    #[serde(default)]
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
    #[serde(default)]
    manifests: Vec<Descriptor>,
}

/// A synthesized artifact set, backed by a temporary file that is removed
/// when the blob is dropped.
#[derive(Debug)]
pub struct ArtifactBlob {
    file: NamedTempFile,
    media_type: String,
    digest: String,
    size: u64,
}

impl ArtifactBlob {
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// OCI digest of the archive.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Reads the archive bytes.
    pub fn read(&self) -> Result<Vec<u8>> {
        fs::read(self.file.path()).map_err(|e| Error::io("reading artifact blob", e))
    }
}

/// Media type of the content described by a manifest media type.
fn content_media_type(media_type: &str) -> &str {
    media_type.strip_suffix("+json").unwrap_or(media_type)
}

/// Packages the artifact `reference` of `ns` with all blobs it references
/// and its side artifacts into an artifact set blob.
///
/// The manifest is tagged with `reference` unless it is a digest, and marked
/// as main artifact. The temporary file is removed on every failure.
pub async fn synthesize_artifact_blob(ns: &dyn Namespace, reference: &str) -> Result<ArtifactBlob> {
    let artifact = ns
        .get_artifact(reference)
        .await
        .map_err(|e| Error::resolution_failed(reference, "artifact lookup failed", Some(e.into())))?;
    let digest = artifact.digest();
    if oci::is_digest(reference) && reference != digest {
        return Err(Error::digest_mismatch(
            format!("artifact {reference}"),
            reference,
            &digest,
        ));
    }

    let mut temp = tempfile::Builder::new()
        .prefix("artifactblob")
        .suffix(".tgz")
        .tempfile()
        .map_err(|e| Error::io("creating temporary file", e))?;

    let mut set = ArtifactSet::new();
    let mut visited = HashSet::new();
    transfer(ns, &mut set, artifact.clone(), &mut visited).await?;

    if !oci::is_digest(reference) {
        set.add_tags(&digest, &[reference])?;
    }
    set.annotate(MAIN_ARTIFACT_ANNOTATION, &digest)?;

    let file = set.write_to(temp.as_file_mut())?;
    file.flush()
        .map_err(|e| Error::io("flushing artifact blob", e))?;
    set.close();

    let archive = fs::read(temp.path()).map_err(|e| Error::io("reading artifact blob", e))?;
    let size = archive.len() as u64;

    let media_type = format!(
        "{}{ARCHIVE_MEDIA_SUFFIX}",
        content_media_type(&artifact.media_type)
    );
    debug!("synthesized {reference} as {media_type} ({size} bytes)");
    Ok(ArtifactBlob {
        file: temp,
        media_type,
        digest: oci_digest(&archive),
        size,
    })
}

/// Copies `artifact`, the blobs and nested manifests it references and its
/// side artifacts into `set`.
async fn transfer(
    ns: &dyn Namespace,
    set: &mut ArtifactSet,
    artifact: Artifact,
    visited: &mut HashSet<String>,
) -> Result<()> {
    let mut pending = vec![artifact];
    while let Some(artifact) = pending.pop() {
        let digest = artifact.digest();
        if !visited.insert(digest.clone()) {
            continue;
        }
        trace!("transferring {digest}");

        let links: ManifestLinks = serde_json::from_slice(&artifact.manifest).map_err(|source| {
            Error::Decode {
                kind: format!("manifest {digest}"),
                source,
            }
        })?;
        set.add_blob_with_digest(&digest, artifact.manifest)?;
        set.add_manifest(&artifact.media_type, &digest)?;

        for d in links.config.iter().chain(links.layers.iter()) {
            if set.has_blob(&d.digest) {
                continue;
            }
            let blob = ns.get_blob(&d.digest).await.map_err(|e| {
                Error::resolution_failed(&d.digest, "blob lookup failed", Some(e.into()))
            })?;
            set.add_blob_with_digest(&d.digest, blob)
                .map_err(|e| Error::wrap(format!("blob of {digest}"), e))?;
        }

        for d in &links.manifests {
            let nested = ns.get_artifact(&d.digest).await.map_err(|e| {
                Error::resolution_failed(&d.digest, "manifest lookup failed", Some(e.into()))
            })?;
            pending.push(nested);
        }

        let side = ns
            .side_artifacts(&digest)
            .await
            .map_err(|e| Error::resolution_failed(&digest, "side artifact lookup failed", Some(e.into())))?;
        for reference in side {
            let side_artifact = ns.get_artifact(&reference).await.map_err(|e| {
                Error::resolution_failed(&reference, "side artifact lookup failed", Some(e.into()))
            })?;
            if !oci::is_digest(&reference) {
                let side_digest = side_artifact.digest();
                set.add_blob_with_digest(&side_digest, side_artifact.manifest.clone())?;
                set.add_manifest(&side_artifact.media_type, &side_digest)?;
                set.add_tags(&side_digest, &[reference.as_str()])?;
            }
            pending.push(side_artifact);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_media_type_strips_json() {
        assert_eq!(
            content_media_type("application/vnd.oci.image.manifest.v1+json"),
            "application/vnd.oci.image.manifest.v1"
        );
        assert_eq!(content_media_type("application/custom"), "application/custom");
    }

    #[test]
    fn manifest_links_parse() {
        let links: ManifestLinks = serde_json::from_str(
            r#"{"schemaVersion":2,"config":{"mediaType":"c","digest":"sha256:aa"},
                "layers":[{"mediaType":"l","digest":"sha256:bb","size":3}]}"#,
        )
        .unwrap();
        assert_eq!(links.config.unwrap().digest, "sha256:aa");
        assert_eq!(links.layers.len(), 1);
        assert!(links.manifests.is_empty());
    }
}
