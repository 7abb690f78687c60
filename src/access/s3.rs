use serde::{Deserialize, Serialize};

use super::{AccessSpec, BlobReference};

/// Access to an object in an S3 bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Access {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl S3Access {
    pub fn blob_reference(&self) -> BlobReference {
        let locator = match &self.version {
            Some(v) => format!("s3://{}/{}?versionId={v}", self.bucket, self.key),
            None => format!("s3://{}/{}", self.bucket, self.key),
        };
        BlobReference::Remote { locator }
    }
}

impl From<S3Access> for AccessSpec {
    fn from(a: S3Access) -> Self {
        AccessSpec::S3(a)
    }
}
