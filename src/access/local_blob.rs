use serde::{Deserialize, Serialize};

use super::{AccessSpec, BlobReference};

/// Access to a blob stored with the component version itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalBlobAccess {
    /// Digest of the blob in the local blob store (`sha256:<hex>`)
    pub local_reference: String,
    pub media_type: String,
    /// Name hint used when the blob is uploaded to another repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_name: Option<String>,
}

impl LocalBlobAccess {
    /// Creates a local blob access for the stored blob `local_reference`.
    pub fn new(local_reference: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            local_reference: local_reference.into(),
            media_type: media_type.into(),
            reference_name: None,
        }
    }

    pub fn blob_reference(&self) -> BlobReference {
        BlobReference::Local {
            digest: self.local_reference.clone(),
            media_type: self.media_type.clone(),
        }
    }
}

impl From<LocalBlobAccess> for AccessSpec {
    fn from(a: LocalBlobAccess) -> Self {
        AccessSpec::LocalBlob(a)
    }
}
