//! Typed access specifications for resources.
//!
//! A resource carries its access as a tagged JSON object
//! `{ "type": "<discriminator>", ... }`. The [`AccessTypeRegistry`] decodes
//! it into an [`AccessSpec`]; the signing pipeline only relies on the
//! [`BlobReference`] an access spec produces, never on the concrete variant.

/// Local blob access, stored alongside the component version
pub mod local_blob;
/// OCI artifact and OCI blob access
pub mod oci;
/// Access type registry and decoding
pub mod registry;
/// S3 object access
pub mod s3;

pub use local_blob::LocalBlobAccess;
pub use oci::{OciArtifactAccess, OciBlobAccess};
pub use registry::{AccessType, AccessTypeRegistry, KIND_ACCESS_TYPE};
pub use s3::S3Access;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

pub const LOCAL_BLOB_TYPE: &str = "localBlob";
pub const OCI_ARTIFACT_TYPE: &str = "ociArtifact";
pub const OCI_BLOB_TYPE: &str = "ociBlob";
pub const S3_TYPE: &str = "s3";
pub const NONE_TYPE: &str = "none";

/// Decoded access specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum AccessSpec {
    #[serde(rename = "localBlob")]
    LocalBlob(LocalBlobAccess),
    #[serde(rename = "ociArtifact")]
    OciArtifact(OciArtifactAccess),
    #[serde(rename = "ociBlob")]
    OciBlob(OciBlobAccess),
    #[serde(rename = "s3")]
    S3(S3Access),
    /// The resource has no accessible content.
    #[serde(rename = "none")]
    None,
}

/// Where the content of a resource can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobReference {
    /// Blob stored with the component version, addressed by its digest.
    Local { digest: String, media_type: String },
    /// Blob held by an external store, resolved by the caller's resolver.
    Remote { locator: String },
    None,
}

/// Marker payload for the `none` access type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoneAccess {}

impl From<NoneAccess> for AccessSpec {
    fn from(_: NoneAccess) -> Self {
        AccessSpec::None
    }
}

impl AccessSpec {
    /// Canonical type name, as written to descriptors.
    pub fn access_type(&self) -> &'static str {
        match self {
            AccessSpec::LocalBlob(_) => LOCAL_BLOB_TYPE,
            AccessSpec::OciArtifact(_) => OCI_ARTIFACT_TYPE,
            AccessSpec::OciBlob(_) => OCI_BLOB_TYPE,
            AccessSpec::S3(_) => S3_TYPE,
            AccessSpec::None => NONE_TYPE,
        }
    }

    /// `true` for blobs stored alongside the component version.
    pub fn is_local(&self) -> bool {
        matches!(self, AccessSpec::LocalBlob(_))
    }

    /// Where the content lives, handed to the resolver.
    pub fn blob_reference(&self) -> BlobReference {
        match self {
            AccessSpec::LocalBlob(a) => a.blob_reference(),
            AccessSpec::OciArtifact(a) => a.blob_reference(),
            AccessSpec::OciBlob(a) => a.blob_reference(),
            AccessSpec::S3(a) => a.blob_reference(),
            AccessSpec::None => BlobReference::None,
        }
    }

    /// Tagged wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| Error::Decode {
            kind: self.access_type().to_owned(),
            source,
        })
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|source| Error::Decode {
            kind: self.access_type().to_owned(),
            source,
        })
    }
}
