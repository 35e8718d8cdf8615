use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A resource tag as attached to a provisioned repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Overlays each map in `layers` onto `defaults`, later layers winning.
pub fn merge_tags(defaults: &HashMap<String, String>, layers: &[&HashMap<String, String>]) -> Vec<Tag> {
    let mut merged: BTreeMap<&str, &str> = defaults
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    for layer in layers.iter() {
        for (k, v) in layer.iter() {
            if let Some(old) = merged.insert(k, v) {
                log::trace!("Tag {} overridden: {} -> {}", k, old, v);
            }
        }
    }
    merged
        .into_iter()
        .map(|(key, value)| Tag {
            key: key.to_owned(),
            value: value.to_owned(),
        })
        .collect()
}
