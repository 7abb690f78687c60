use serde::{Deserialize, Serialize};

use super::{AccessSpec, BlobReference};

/// Access to an artifact in an OCI registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciArtifactAccess {
    /// Full image reference, e.g. `ghcr.io/acme/app:1.0.0`
    pub image_reference: String,
}

impl OciArtifactAccess {
    pub fn new(image_reference: impl Into<String>) -> Self {
        Self {
            image_reference: image_reference.into(),
        }
    }

    pub fn blob_reference(&self) -> BlobReference {
        BlobReference::Remote {
            locator: self.image_reference.clone(),
        }
    }
}

impl From<OciArtifactAccess> for AccessSpec {
    fn from(a: OciArtifactAccess) -> Self {
        AccessSpec::OciArtifact(a)
    }
}

/// Access to a single blob of an OCI repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciBlobAccess {
    /// Repository reference without tag
    #[serde(rename = "ref")]
    pub reference: String,
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

impl OciBlobAccess {
    pub fn blob_reference(&self) -> BlobReference {
        BlobReference::Remote {
            locator: format!("{}@{}", self.reference, self.digest),
        }
    }
}

impl From<OciBlobAccess> for AccessSpec {
    fn from(a: OciBlobAccess) -> Self {
        AccessSpec::OciBlob(a)
    }
}
