use super::{normalization::canonical_tree, ComponentDescriptor, Normalization};
use crate::errors::{Error, Result};

pub const JSON_NORMALISATION_V2: &str = "jsonNormalisation/v2";

/// JCS (RFC 8785) form of the canonical tree. Only labels flagged with
/// `signing: true` take part.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonNormalisationV2;

impl Normalization for JsonNormalisationV2 {
    fn name(&self) -> &str {
        JSON_NORMALISATION_V2
    }

    fn normalize(&self, cd: &ComponentDescriptor) -> Result<Vec<u8>> {
        let tree = canonical_tree(cd, |l| l.signing);
        let jcs = serde_jcs::to_string(&tree).map_err(|source| Error::Decode {
            kind: JSON_NORMALISATION_V2.to_owned(),
            source,
        })?;
        Ok(jcs.into_bytes())
    }
}
