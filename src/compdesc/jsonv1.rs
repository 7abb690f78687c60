use serde_json::{Map, Value};

use super::{normalization::canonical_tree, ComponentDescriptor, Normalization};
use crate::errors::{Error, Result};

pub const JSON_NORMALISATION_V1: &str = "jsonNormalisation/v1";

/// Entry-list normalization.
///
/// Every object of the canonical tree becomes an array of single-key maps
/// sorted by key, so the serialized form does not depend on map ordering of
/// any JSON implementation. All labels take part.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonNormalisationV1;

impl Normalization for JsonNormalisationV1 {
    fn name(&self) -> &str {
        JSON_NORMALISATION_V1
    }

    fn normalize(&self, cd: &ComponentDescriptor) -> Result<Vec<u8>> {
        let tree = to_entries(canonical_tree(cd, |_| true));
        serde_json::to_vec(&tree).map_err(|source| Error::Decode {
            kind: JSON_NORMALISATION_V1.to_owned(),
            source,
        })
    }
}

fn to_entries(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Array(
                entries
                    .into_iter()
                    .map(|(k, v)| {
                        let mut entry = Map::new();
                        entry.insert(k, to_entries(v));
                        Value::Object(entry)
                    })
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(to_entries).collect()),
        scalar => scalar,
    }
}
