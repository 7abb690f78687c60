use std::{collections::BTreeMap, fmt};

use log::trace;
use serde::{de::DeserializeOwned, Deserialize};

use super::{
    AccessSpec, LocalBlobAccess, NoneAccess, OciArtifactAccess, OciBlobAccess, S3Access,
    LOCAL_BLOB_TYPE, NONE_TYPE, OCI_ARTIFACT_TYPE, OCI_BLOB_TYPE, S3_TYPE,
};
use crate::errors::{Error, Result};

pub const KIND_ACCESS_TYPE: &str = "access type";

type DecodeFn = fn(&[u8]) -> serde_json::Result<AccessSpec>;

fn decode_as<T>(data: &[u8]) -> serde_json::Result<AccessSpec>
where
    T: DeserializeOwned + Into<AccessSpec>,
{
    serde_json::from_slice::<T>(data).map(Into::into)
}

/// A registered access type: a discriminator and the decoder for its shape.
#[derive(Clone)]
pub struct AccessType {
    name: String,
    decode: DecodeFn,
}

impl AccessType {
    /// Declares an access type whose payload has the shape of `T`.
    pub fn new<T>(name: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Into<AccessSpec>,
    {
        Self {
            name: name.into(),
            decode: decode_as::<T>,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decodes raw JSON into a typed access specification.
    pub fn decode(&self, data: &[u8]) -> Result<AccessSpec> {
        (self.decode)(data).map_err(|source| Error::Decode {
            kind: format!("{KIND_ACCESS_TYPE} {}", self.name),
            source,
        })
    }
}

impl fmt::Debug for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessType").field("name", &self.name).finish()
    }
}

#[derive(Deserialize)]
struct TypeTag {
    #[serde(rename = "type")]
    access_type: String,
}

/// Name-keyed access type registry.
///
/// Registration is append-only: a name can be registered once and is never
/// removed. Versioned aliases such as `localBlob/v1` are registered as
/// separate names sharing a decoder.
#[derive(Debug, Clone, Default)]
pub struct AccessTypeRegistry {
    types: BTreeMap<String, AccessType>,
}

impl AccessTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in access types and their `/v1` aliases.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let builtin = [
            AccessType::new::<LocalBlobAccess>(LOCAL_BLOB_TYPE),
            AccessType::new::<OciArtifactAccess>(OCI_ARTIFACT_TYPE),
            AccessType::new::<OciBlobAccess>(OCI_BLOB_TYPE),
            AccessType::new::<S3Access>(S3_TYPE),
            AccessType::new::<NoneAccess>(NONE_TYPE),
        ];
        for t in builtin {
            let alias = AccessType {
                name: format!("{}/v1", t.name),
                decode: t.decode,
            };
            registry.types.insert(alias.name.clone(), alias);
            registry.types.insert(t.name.clone(), t);
        }
        registry
    }

    /// Adds `access_type` and its aliases.
    ///
    /// # Returns
    ///
    /// An already-exists error if any of its names is taken.
    pub fn register_type(&mut self, access_type: AccessType) -> Result<()> {
        if self.types.contains_key(&access_type.name) {
            return Err(Error::already_exists(KIND_ACCESS_TYPE, access_type.name));
        }
        trace!("registering access type {}", access_type.name);
        self.types.insert(access_type.name.clone(), access_type);
        Ok(())
    }

    pub fn register<T>(&mut self, name: impl Into<String>) -> Result<()>
    where
        T: DeserializeOwned + Into<AccessSpec>,
    {
        self.register_type(AccessType::new::<T>(name))
    }

    pub fn get(&self, name: &str) -> Option<&AccessType> {
        self.types.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Decodes `data` with the decoder registered for `name`.
    pub fn decode(&self, name: &str, data: &[u8]) -> Result<AccessSpec> {
        let access_type = self
            .get(name)
            .ok_or_else(|| Error::unknown(KIND_ACCESS_TYPE, name))?;
        access_type.decode(data)
    }

    /// Decodes a tagged payload, dispatching on its `type` field.
    pub fn decode_typed(&self, data: &[u8]) -> Result<AccessSpec> {
        let tag: TypeTag = serde_json::from_slice(data).map_err(|source| Error::Decode {
            kind: KIND_ACCESS_TYPE.to_owned(),
            source,
        })?;
        self.decode(&tag.access_type, data)
    }

    /// Decodes an already parsed JSON value.
    pub fn decode_value(&self, value: &serde_json::Value) -> Result<AccessSpec> {
        let data = serde_json::to_vec(value).map_err(|source| Error::Decode {
            kind: KIND_ACCESS_TYPE.to_owned(),
            source,
        })?;
        self.decode_typed(&data)
    }
}
