//! Dotted-path access into YAML configuration trees.
//!
//! Paths are written `trainer.profiler.dirpath`; a numeric segment indexes
//! into a sequence (`tags.0`). The empty path addresses the root.

use serde_yaml::{Mapping, Value};

/// Key every instantiable node uses to name its factory entry.
pub const TARGET_KEY: &str = "_target_";

/// Joins a parent path and a child key.
pub fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for seg in segments(path) {
        node = match node {
            Value::Mapping(map) => map.get(seg)?,
            Value::Sequence(seq) => seq.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

pub fn get_path_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut node = root;
    for seg in segments(path) {
        node = match node {
            Value::Mapping(map) => map.get_mut(seg)?,
            Value::Sequence(seq) => seq.get_mut(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Returns the node at `path`, creating intermediate mappings on the way.
/// Scalars met along the path are replaced by empty mappings.
pub fn entry_path<'a>(root: &'a mut Value, path: &str) -> &'a mut Value {
    let mut node = root;
    for seg in segments(path) {
        if !node.is_mapping() {
            *node = Value::Mapping(Mapping::new());
        }
        if let Value::Mapping(map) = node {
            node = map
                .entry(Value::String(seg.to_string()))
                .or_insert(Value::Null);
        }
    }
    node
}

pub fn set_path(root: &mut Value, path: &str, value: Value) {
    *entry_path(root, path) = value;
}

/// Removes the node at `path`, keeping the order of its siblings.
pub fn remove_path(root: &mut Value, path: &str) -> Option<Value> {
    let (parent, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (parent, key),
        None => ("", path),
    };
    match get_path_mut(root, parent)? {
        Value::Mapping(map) => map.shift_remove(key),
        _ => None,
    }
}

/// Short name of a node's YAML type, used in error messages.
pub fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("bool ({})", b),
        Value::Number(n) if n.is_f64() => format!("float ({})", n),
        Value::Number(n) => format!("int ({})", n),
        Value::String(s) => format!("string ({:?})", s),
        Value::Sequence(_) => "list".to_string(),
        Value::Mapping(_) => "mapping".to_string(),
        Value::Tagged(tagged) => format!("tagged value ({})", tagged.tag),
    }
}

/// Renders a scalar the way it reads in YAML, for string interpolation.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("null".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Reads the `_target_` name of an instantiable node.
pub fn target_of(value: &Value) -> Option<&str> {
    value.as_mapping()?.get(TARGET_KEY)?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> Value {
        serde_yaml::from_str(src).expect("valid yaml")
    }

    #[test]
    fn get_path_walks_mappings_and_sequences() {
        let root = yaml("trainer:\n  devices: [0, 3]\n  accelerator: gpu\n");
        assert_eq!(get_path(&root, "trainer.accelerator"), Some(&Value::from("gpu")));
        assert_eq!(get_path(&root, "trainer.devices.1"), Some(&Value::from(3)));
        assert!(get_path(&root, "trainer.missing").is_none());
        assert_eq!(get_path(&root, ""), Some(&root));
    }

    #[test]
    fn set_path_creates_intermediate_mappings() {
        let mut root = yaml("paths: 3");
        set_path(&mut root, "paths.output_dir", Value::from("/tmp/run"));
        assert_eq!(get_path(&root, "paths.output_dir"), Some(&Value::from("/tmp/run")));
    }

    #[test]
    fn remove_path_keeps_sibling_order() {
        let mut root = yaml("a: 1\nb: 2\nc: 3\n");
        assert_eq!(remove_path(&mut root, "a"), Some(Value::from(1)));
        let keys: Vec<_> = root
            .as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["b", "c"]);
    }
}
