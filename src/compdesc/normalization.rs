use serde_json::{Map, Value};

use super::{ComponentDescriptor, Label};
use crate::{digest::Digest, errors::Result};

/// Maps a component descriptor to the canonical byte form that is hashed.
pub trait Normalization: Send + Sync {
    /// Registered algorithm name, recorded in every digest it produces.
    fn name(&self) -> &str;

    fn normalize(&self, cd: &ComponentDescriptor) -> Result<Vec<u8>>;
}

/// Builds the signing-relevant subset of a descriptor as a JSON tree.
///
/// Access specifications and signatures never take part. Labels are sorted by
/// name, then by serialized value, and filtered by `keep_label`; resources, sources and references stay
/// in list order since their order is meaningful.
pub(crate) fn canonical_tree(cd: &ComponentDescriptor, keep_label: fn(&Label) -> bool) -> Value {
    let c = &cd.component;

    let mut component = Map::new();
    component.insert("name".into(), c.name.clone().into());
    component.insert("version".into(), c.version.clone().into());
    component.insert("provider".into(), c.provider.clone().into());
    insert_labels(&mut component, &c.labels, keep_label);

    let resources = c
        .resources
        .iter()
        .map(|r| {
            let mut m = Map::new();
            m.insert("name".into(), r.name.clone().into());
            m.insert("version".into(), r.version.clone().into());
            m.insert("type".into(), r.resource_type.clone().into());
            m.insert("relation".into(), r.relation.to_string().into());
            insert_identity(&mut m, &r.extra_identity);
            insert_labels(&mut m, &r.labels, keep_label);
            insert_digest(&mut m, r.digest.as_ref());
            Value::Object(m)
        })
        .collect();
    component.insert("resources".into(), Value::Array(resources));

    let sources = c
        .sources
        .iter()
        .map(|s| {
            let mut m = Map::new();
            m.insert("name".into(), s.name.clone().into());
            m.insert("version".into(), s.version.clone().into());
            m.insert("type".into(), s.source_type.clone().into());
            insert_identity(&mut m, &s.extra_identity);
            insert_labels(&mut m, &s.labels, keep_label);
            Value::Object(m)
        })
        .collect();
    component.insert("sources".into(), Value::Array(sources));

    let references = c
        .component_references
        .iter()
        .map(|r| {
            let mut m = Map::new();
            m.insert("name".into(), r.name.clone().into());
            m.insert("componentName".into(), r.component_name.clone().into());
            m.insert("version".into(), r.version.clone().into());
            insert_identity(&mut m, &r.extra_identity);
            insert_labels(&mut m, &r.labels, keep_label);
            insert_digest(&mut m, r.digest.as_ref());
            Value::Object(m)
        })
        .collect();
    component.insert("componentReferences".into(), Value::Array(references));

    let mut meta = Map::new();
    meta.insert("schemaVersion".into(), cd.meta.schema_version.clone().into());

    let mut root = Map::new();
    root.insert("meta".into(), Value::Object(meta));
    root.insert("component".into(), Value::Object(component));
    Value::Object(root)
}

fn insert_labels(m: &mut Map<String, Value>, labels: &[Label], keep_label: fn(&Label) -> bool) {
    let mut kept: Vec<&Label> = labels.iter().filter(|l| keep_label(l)).collect();
    if kept.is_empty() {
        return;
    }
    kept.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.value.to_string().cmp(&b.value.to_string()))
    });
    let labels = kept
        .into_iter()
        .map(|l| {
            let mut lm = Map::new();
            lm.insert("name".into(), l.name.clone().into());
            lm.insert("value".into(), l.value.clone());
            Value::Object(lm)
        })
        .collect();
    m.insert("labels".into(), Value::Array(labels));
}

fn insert_identity(
    m: &mut Map<String, Value>,
    identity: &std::collections::BTreeMap<String, String>,
) {
    if identity.is_empty() {
        return;
    }
    let identity = identity
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    m.insert("extraIdentity".into(), Value::Object(identity));
}

fn insert_digest(m: &mut Map<String, Value>, digest: Option<&Digest>) {
    if let Some(d) = digest {
        let mut dm = Map::new();
        dm.insert("hashAlgorithm".into(), d.hash_algorithm.clone().into());
        dm.insert(
            "normalisationAlgorithm".into(),
            d.normalisation_algorithm.clone().into(),
        );
        dm.insert("value".into(), d.value.clone().into());
        m.insert("digest".into(), Value::Object(dm));
    }
}
