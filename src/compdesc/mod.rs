//! Component descriptor model and its normalizations.

/// `jsonNormalisation/v1`
pub mod jsonv1;
/// `jsonNormalisation/v2`
pub mod jsonv2;
/// Normalization trait and the shared canonical tree
pub mod normalization;

pub use jsonv1::JsonNormalisationV1;
pub use jsonv2::JsonNormalisationV2;
pub use normalization::Normalization;

use std::collections::BTreeMap;

use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    digest::Digest,
    errors::{Error, Result},
    history::NameVersion,
};

pub const SCHEMA_VERSION: &str = "v2";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub schema_version: String,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub name: String,
    pub value: Value,
    /// Only labels flagged for signing take part in `jsonNormalisation/v2`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub signing: bool,
}

impl Label {
    /// Creates a label excluded from `jsonNormalisation/v2` digests.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            signing: false,
        }
    }

    /// Flags the label as signing relevant.
    pub fn signing(mut self) -> Self {
        self.signing = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Relation {
    #[default]
    Local,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub relation: Relation,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_identity: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    /// Tagged access specification, decoded through the access type registry.
    pub access: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_identity: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    pub access: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReference {
    pub name: String,
    pub component_name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_identity: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
}

impl ComponentReference {
    /// Creates a reference without a recorded digest.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the reference within the component.
    /// * `component_name` - Name of the referenced component.
    /// * `version` - Version of the referenced component.
    pub fn new(
        name: impl Into<String>,
        component_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            component_name: component_name.into(),
            version: version.into(),
            extra_identity: BTreeMap::new(),
            labels: Vec::new(),
            digest: None,
        }
    }

    pub fn name_version(&self) -> NameVersion {
        NameVersion::new(&self.component_name, &self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub component_references: Vec<ComponentReference>,
}

/// Signature value with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSpec {
    pub algorithm: String,
    /// Hex encoded signature bytes
    pub value: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampSpec {
    /// Base64 encoded timestamp token
    pub value: String,
    pub time: DateTime<Utc>,
}

impl TimestampSpec {
    /// Stores a raw token issued at `time`, base64 encoded.
    pub fn new(token: &[u8], time: DateTime<Utc>) -> Self {
        Self {
            value: BASE64.encode(token),
            time,
        }
    }

    /// The raw timestamp token.
    pub fn token(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.value)
            .map_err(|e| Error::wrap("timestamp token", e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub name: String,
    pub digest: Digest,
    pub signature: SignatureSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    #[serde(default)]
    pub meta: Meta,
    pub component: Component,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<Signature>,
}

impl ComponentDescriptor {
    /// Creates a descriptor without resources, references or signatures.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            meta: Meta::default(),
            component: Component {
                name: name.into(),
                version: version.into(),
                provider: provider.into(),
                labels: Vec::new(),
                resources: Vec::new(),
                sources: Vec::new(),
                component_references: Vec::new(),
            },
            signatures: Vec::new(),
        }
    }

    pub fn name_version(&self) -> NameVersion {
        NameVersion::new(&self.component.name, &self.component.version)
    }

    /// The signature named `name`, if present.
    pub fn signature(&self, name: &str) -> Option<&Signature> {
        self.signatures.iter().find(|s| s.name == name)
    }

    /// Adds `signature`, replacing an existing one of the same name.
    pub fn set_signature(&mut self, signature: Signature) {
        match self.signatures.iter_mut().find(|s| s.name == signature.name) {
            Some(existing) => *existing = signature,
            None => self.signatures.push(signature),
        }
    }

    /// Parses a descriptor from its JSON form.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|source| Error::Decode {
            kind: "component descriptor".to_owned(),
            source,
        })
    }

    /// Serializes the descriptor, signatures included.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|source| Error::Decode {
            kind: "component descriptor".to_owned(),
            source,
        })
    }
}
