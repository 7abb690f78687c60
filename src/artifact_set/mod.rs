//! Digest-indexed artifact archives (common transport format).
//!
//! An [`ArtifactSet`] holds blobs keyed by their OCI digest, an index of
//! manifests with their tags and a set of annotations. It is serialized as a
//! gzip compressed tar stream:
//!
//! ```text
//! artifact-index.json
//! blobs/sha256.<hex>
//! ...
//! ```

/// Synthesis of artifact set blobs from a namespace
pub mod synthesis;

pub use synthesis::{synthesize_artifact_blob, Artifact, ArtifactBlob, Namespace};

use std::{
    collections::BTreeMap,
    io::{Read, Write},
    path::Path,
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use tar::{Archive, Builder, Header};

use crate::{
    digest::oci::{self, oci_digest},
    errors::{Error, Result},
};

pub const ARTIFACT_INDEX_FILE: &str = "artifact-index.json";
pub const BLOB_DIR: &str = "blobs";

/// Annotation naming the digest of the main artifact of a set.
pub const MAIN_ARTIFACT_ANNOTATION: &str = "software.ocm/main";

/// Suffix of the media type of a serialized set.
pub const ARCHIVE_MEDIA_SUFFIX: &str = "+tar+gzip";

const INDEX_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactIndex {
    pub schema_version: u32,
    #[serde(default)]
    pub manifests: Vec<ManifestEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Default for ArtifactIndex {
    fn default() -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            manifests: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }
}

/// In-memory artifact set.
///
/// Blob writes are idempotent. Tags and the main artifact annotation only
/// ever point at stored blobs. After [`close`](Self::close) every write
/// fails until the set is [reopened](Self::reopen).
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    blobs: BTreeMap<String, Vec<u8>>,
    index: ArtifactIndex,
    closed: bool,
}

impl ArtifactSet {
    /// Creates an empty, open artifact set.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self, operation: &str) -> Result<()> {
        if self.closed {
            return Err(Error::invalid("operation on closed artifact set", operation));
        }
        Ok(())
    }

    /// Stores `data` and returns its digest.
    pub fn add_blob(&mut self, data: Vec<u8>) -> Result<String> {
        let digest = oci_digest(&data);
        self.insert_blob(digest.clone(), data)?;
        Ok(digest)
    }

    /// Stores `data` under `digest` after checking the content matches.
    pub fn add_blob_with_digest(&mut self, digest: &str, data: Vec<u8>) -> Result<()> {
        oci::verify(&data, digest)?;
        self.insert_blob(digest.to_owned(), data)
    }

    fn insert_blob(&mut self, digest: String, data: Vec<u8>) -> Result<()> {
        self.check_open("add blob")?;
        match self.blobs.get(&digest) {
            Some(existing) if *existing == data => {
                trace!("blob {digest} already present");
                Ok(())
            }
            Some(existing) => {
                let (algorithm, _) = oci::parse(&digest)?;
                Err(Error::digest_mismatch(
                    format!("blob {digest}"),
                    &digest,
                    oci::digest_with(algorithm, existing)?,
                ))
            }
            None => {
                trace!("adding blob {digest} ({} bytes)", data.len());
                self.blobs.insert(digest, data);
                Ok(())
            }
        }
    }

    /// Content of the blob `digest`.
    pub fn get_blob(&self, digest: &str) -> Option<&[u8]> {
        self.blobs.get(digest).map(Vec::as_slice)
    }

    pub fn has_blob(&self, digest: &str) -> bool {
        self.blobs.contains_key(digest)
    }

    pub fn blob_digests(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }

    pub fn index(&self) -> &ArtifactIndex {
        &self.index
    }

    /// Index entry of the manifest `digest`.
    pub fn manifest(&self, digest: &str) -> Option<&ManifestEntry> {
        self.index.manifests.iter().find(|m| m.digest == digest)
    }

    /// Registers the stored blob `digest` as a manifest of `media_type`.
    pub fn add_manifest(&mut self, media_type: &str, digest: &str) -> Result<()> {
        self.check_open("add manifest")?;
        let size = self
            .blobs
            .get(digest)
            .map(|b| b.len() as u64)
            .ok_or_else(|| Error::not_found("blob", digest))?;
        if self.manifest(digest).is_some() {
            return Ok(());
        }
        self.index.manifests.push(ManifestEntry {
            media_type: media_type.to_owned(),
            digest: digest.to_owned(),
            size,
            tags: Vec::new(),
        });
        Ok(())
    }

    /// Tags the manifest `digest`. A tag held by another manifest moves.
    pub fn add_tags(&mut self, digest: &str, tags: &[&str]) -> Result<()> {
        self.check_open("add tags")?;
        if self.manifest(digest).is_none() {
            return Err(Error::not_found("manifest", digest));
        }
        for tag in tags {
            for m in self.index.manifests.iter_mut() {
                if m.digest == digest {
                    if !m.tags.iter().any(|t| t == tag) {
                        m.tags.push((*tag).to_owned());
                    }
                } else {
                    m.tags.retain(|t| t != tag);
                }
            }
            debug!("tagged {digest} as {tag}");
        }
        Ok(())
    }

    /// Digest of the manifest holding `tag`.
    pub fn resolve_tag(&self, tag: &str) -> Option<&str> {
        self.index
            .manifests
            .iter()
            .find(|m| m.tags.iter().any(|t| t == tag))
            .map(|m| m.digest.as_str())
    }

    /// Sets an annotation. The main artifact annotation must name a stored
    /// blob.
    pub fn annotate(&mut self, key: &str, value: &str) -> Result<()> {
        self.check_open("annotate")?;
        if key == MAIN_ARTIFACT_ANNOTATION && !self.has_blob(value) {
            return Err(Error::not_found("main artifact blob", value));
        }
        self.index
            .annotations
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.index.annotations.get(key).map(String::as_str)
    }

    /// Digest of the main artifact, if annotated.
    pub fn main_artifact(&self) -> Option<&str> {
        self.annotation(MAIN_ARTIFACT_ANNOTATION)
    }

    /// Rejects further writes until [`ArtifactSet::reopen`].
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Makes a closed set writable again for appending.
    pub fn reopen(&mut self) {
        self.closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Serializes the set as tar+gzip into `writer` and returns the writer.
    ///
    /// Entries are written in a fixed order with zeroed timestamps, so equal
    /// sets produce equal archives.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<W> {
        let mut builder = Builder::new(GzEncoder::new(writer, Compression::default()));

        let index = serde_json::to_vec_pretty(&self.index).map_err(|source| Error::Decode {
            kind: "artifact index".to_owned(),
            source,
        })?;
        append(&mut builder, ARTIFACT_INDEX_FILE, &index)?;
        for (digest, data) in &self.blobs {
            let path = format!("{BLOB_DIR}/{}", digest.replacen(':', ".", 1));
            append(&mut builder, &path, data)?;
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| Error::io("finishing archive", e))?;
        let writer = encoder
            .finish()
            .map_err(|e| Error::io("compressing archive", e))?;
        debug!("wrote artifact set with {} blobs", self.blobs.len());
        Ok(writer)
    }

    /// Reads an archive written by [`write_to`](Self::write_to).
    ///
    /// Every blob is checked against the digest in its file name and the
    /// index must only reference stored blobs. The returned set is closed.
    pub fn open<R: Read>(reader: R) -> Result<Self> {
        let mut archive = Archive::new(GzDecoder::new(reader));
        let mut set = Self::new();
        let mut index = None;

        let entries = archive
            .entries()
            .map_err(|e| Error::io("reading archive", e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| Error::io("reading archive entry", e))?;
            let path = entry
                .path()
                .map_err(|e| Error::io("reading archive entry path", e))?
                .to_string_lossy()
                .into_owned();
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| Error::io(format!("reading {path}"), e))?;

            if path == ARTIFACT_INDEX_FILE {
                let parsed: ArtifactIndex =
                    serde_json::from_slice(&data).map_err(|source| Error::Decode {
                        kind: "artifact index".to_owned(),
                        source,
                    })?;
                index = Some(parsed);
            } else if let Some(name) = Path::new(&path)
                .strip_prefix(BLOB_DIR)
                .ok()
                .and_then(|p| p.to_str())
            {
                let digest = name.replacen('.', ":", 1);
                set.add_blob_with_digest(&digest, data)?;
            } else {
                trace!("ignoring archive entry {path}");
            }
        }

        let index = index.ok_or_else(|| Error::not_found("archive entry", ARTIFACT_INDEX_FILE))?;
        for m in &index.manifests {
            if !set.has_blob(&m.digest) {
                return Err(Error::not_found("manifest blob", m.digest.clone()));
            }
        }
        if let Some(main) = index.annotations.get(MAIN_ARTIFACT_ANNOTATION) {
            if !set.has_blob(main) {
                return Err(Error::not_found("main artifact blob", main.clone()));
            }
        }
        set.index = index;
        set.closed = true;
        Ok(set)
    }
}

fn append<W: Write>(builder: &mut Builder<W>, path: &str, data: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mtime(0);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, path, data)
        .map_err(|e| Error::io(format!("writing {path}"), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    const MANIFEST_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

    #[test]
    fn blob_writes_are_idempotent() {
        let mut set = ArtifactSet::new();
        let d1 = set.add_blob(b"layer".to_vec()).unwrap();
        let d2 = set.add_blob(b"layer".to_vec()).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(set.blob_digests().count(), 1);

        let err = set
            .add_blob_with_digest(&d1, b"other".to_vec())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DigestMismatch);
        assert_eq!(set.get_blob(&d1), Some(&b"layer"[..]));
    }

    #[test]
    fn tags_and_annotations_need_stored_blobs() {
        let mut set = ArtifactSet::new();
        let missing = oci_digest(b"missing");
        assert_eq!(
            set.add_manifest(MANIFEST_TYPE, &missing).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            set.add_tags(&missing, &["v1"]).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            set.annotate(MAIN_ARTIFACT_ANNOTATION, &missing)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert!(set.main_artifact().is_none());
    }

    #[test]
    fn tags_move_between_manifests() {
        let mut set = ArtifactSet::new();
        let a = set.add_blob(b"{\"a\":1}".to_vec()).unwrap();
        let b = set.add_blob(b"{\"b\":1}".to_vec()).unwrap();
        set.add_manifest(MANIFEST_TYPE, &a).unwrap();
        set.add_manifest(MANIFEST_TYPE, &b).unwrap();

        set.add_tags(&a, &["latest", "v1"]).unwrap();
        assert_eq!(set.resolve_tag("latest"), Some(a.as_str()));

        set.add_tags(&b, &["latest"]).unwrap();
        assert_eq!(set.resolve_tag("latest"), Some(b.as_str()));
        assert_eq!(set.resolve_tag("v1"), Some(a.as_str()));
        assert_eq!(set.manifest(&a).unwrap().tags, vec!["v1"]);
    }

    #[test]
    fn closed_set_rejects_writes() {
        let mut set = ArtifactSet::new();
        set.close();
        let err = set.add_blob(b"x".to_vec()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(set.annotate("k", "v").is_err());

        set.reopen();
        assert!(set.add_blob(b"x".to_vec()).is_ok());
    }

    #[test]
    fn archive_round_trip() {
        let mut set = ArtifactSet::new();
        let manifest = set.add_blob(br#"{"layers":[]}"#.to_vec()).unwrap();
        let layer = set.add_blob(b"layer data".to_vec()).unwrap();
        set.add_manifest(MANIFEST_TYPE, &manifest).unwrap();
        set.add_tags(&manifest, &["1.0.0"]).unwrap();
        set.annotate(MAIN_ARTIFACT_ANNOTATION, &manifest).unwrap();

        let bytes = set.write_to(Vec::new()).unwrap();
        assert_eq!(bytes, set.write_to(Vec::new()).unwrap());

        let opened = ArtifactSet::open(&bytes[..]).unwrap();
        assert!(opened.is_closed());
        assert_eq!(opened.index(), set.index());
        assert_eq!(opened.get_blob(&layer), Some(&b"layer data"[..]));
        assert_eq!(opened.resolve_tag("1.0.0"), Some(manifest.as_str()));
        assert_eq!(opened.main_artifact(), Some(manifest.as_str()));
    }

    #[test]
    fn open_rejects_tampered_blob() {
        let mut set = ArtifactSet::new();
        let digest = set.add_blob(b"original".to_vec()).unwrap();

        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let index = serde_json::to_vec(set.index()).unwrap();
        append(&mut builder, ARTIFACT_INDEX_FILE, &index).unwrap();
        let path = format!("{BLOB_DIR}/{}", digest.replacen(':', ".", 1));
        append(&mut builder, &path, b"tampered").unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let err = ArtifactSet::open(&bytes[..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DigestMismatch);
    }
}
