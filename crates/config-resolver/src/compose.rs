//! Composition of a base mapping with override fragments.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::node::{self, join_path};

/// A named piece of configuration spliced into the tree at `package`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Where the fragment came from, e.g. `trainer/profiler/simple.yaml`.
    pub name: String,
    /// Dotted path the fragment is merged at; empty for the root.
    pub package: String,
    pub value: Value,
}

impl Fragment {
    pub fn new(name: impl Into<String>, package: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            value,
        }
    }

    /// A fragment merged at the root.
    pub fn root(name: impl Into<String>, value: Value) -> Self {
        Self::new(name, "", value)
    }
}

/// Records which source last set each key of a composed tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Origins {
    by_path: BTreeMap<String, String>,
}

impl Origins {
    pub fn record(&mut self, path: &str, origin: &str) {
        // a replaced subtree forgets where its old children came from
        let prefix = format!("{}.", path);
        self.by_path
            .retain(|key, _| !(key.starts_with(&prefix) || (path.is_empty() && !key.is_empty())));
        self.by_path.insert(path.to_string(), origin.to_string());
    }

    fn record_tree(&mut self, path: &str, value: &Value, origin: &str) {
        self.by_path.insert(path.to_string(), origin.to_string());
        if let Value::Mapping(map) = value {
            for (key, child) in map {
                if let Some(key) = key.as_str() {
                    self.record_tree(&join_path(path, key), child, origin);
                }
            }
        }
    }

    /// Origin of `path`, falling back to its closest recorded ancestor.
    pub fn of(&self, path: &str) -> &str {
        let mut current = path;
        loop {
            if let Some(origin) = self.by_path.get(current) {
                return origin;
            }
            match current.rsplit_once('.') {
                Some((parent, _)) => current = parent,
                None if !current.is_empty() => current = "",
                None => return "<unknown>",
            }
        }
    }
}

/// A merged but not yet interpolated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Composed {
    pub value: Value,
    pub origins: Origins,
}

impl Composed {
    pub fn new(value: Value, origin: &str) -> Self {
        let mut origins = Origins::default();
        origins.record_tree("", &value, origin);
        Self { value, origins }
    }

    /// Deep-merges a fragment; the fragment wins on conflicting keys.
    pub fn merge(&mut self, fragment: &Fragment) {
        let slot = node::entry_path(&mut self.value, &fragment.package);
        merge_values(
            slot,
            &fragment.value,
            &fragment.package,
            &fragment.name,
            &mut self.origins,
        );
    }
}

/// Merges `fragments` into `base` in order.
///
/// Mappings merge key by key; any other overlay value, null included,
/// replaces what was there. Re-applying a fragment changes nothing.
pub fn compose(base: Value, fragments: &[Fragment]) -> Composed {
    let mut composed = Composed::new(base, "<base>");
    for fragment in fragments {
        log::debug!("Merging {} at <{}>", fragment.name, fragment.package);
        composed.merge(fragment);
    }
    composed
}

fn merge_values(base: &mut Value, overlay: &Value, path: &str, origin: &str, origins: &mut Origins) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            origins.by_path.insert(path.to_string(), origin.to_string());
            for (key, overlay_value) in overlay_map {
                let child_path = match key.as_str() {
                    Some(key) => join_path(path, key),
                    None => continue,
                };
                match base_map.get_mut(key) {
                    Some(base_value) => {
                        merge_values(base_value, overlay_value, &child_path, origin, origins)
                    }
                    None => {
                        origins.record(&child_path, origin);
                        origins.record_tree(&child_path, overlay_value, origin);
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            origins.record(path, origin);
            origins.record_tree(path, overlay_value, origin);
            *base_value = overlay_value.clone();
        }
    }
}

/// Empty root mapping to compose onto.
pub fn empty() -> Value {
    Value::Mapping(Mapping::new())
}
