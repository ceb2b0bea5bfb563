//! Declared value domains for instantiable targets.

use std::fmt;

use serde_yaml::{Mapping, Value};

use crate::compose::Origins;
use crate::error::{ConfigError, Result};
use crate::node::{self, join_path, TARGET_KEY};
use crate::Strictness;

/// The semantic type a field accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    Bool,
    Int,
    /// An integer `>= 0`.
    UInt,
    /// Any number; integers are accepted where floats are expected.
    Float,
    Str,
    /// One of a fixed set of strings.
    Enum(&'static [&'static str]),
    /// `"auto"` or the inner type.
    Auto(&'static FieldType),
    /// `null` or the inner type.
    Nullable(&'static FieldType),
    OneOf(&'static [FieldType]),
    List(&'static FieldType),
    /// A mapping carrying `_target_`.
    Target,
    Any,
}

impl FieldType {
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Any, _) => true,
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::UInt, Value::Number(n)) => n.is_u64(),
            (FieldType::Float, Value::Number(_)) => true,
            (FieldType::Str, Value::String(_)) => true,
            (FieldType::Enum(variants), Value::String(s)) => variants.contains(&s.as_str()),
            (FieldType::Auto(_), Value::String(s)) if s == "auto" => true,
            (FieldType::Auto(inner), other) => inner.accepts(other),
            (FieldType::Nullable(_), Value::Null) => true,
            (FieldType::Nullable(inner), other) => inner.accepts(other),
            (FieldType::OneOf(options), other) => options.iter().any(|t| t.accepts(other)),
            (FieldType::List(inner), Value::Sequence(items)) => items.iter().all(|v| inner.accepts(v)),
            (FieldType::Target, other) => node::target_of(other).is_some(),
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => write!(f, "bool"),
            FieldType::Int => write!(f, "int"),
            FieldType::UInt => write!(f, "non-negative int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Str => write!(f, "string"),
            FieldType::Enum(variants) => write!(f, "one of [{}]", variants.join(", ")),
            FieldType::Auto(inner) => write!(f, "\"auto\" or {}", inner),
            FieldType::Nullable(inner) => write!(f, "null or {}", inner),
            FieldType::OneOf(options) => {
                let names: Vec<String> = options.iter().map(|t| t.to_string()).collect();
                write!(f, "{}", names.join(" or "))
            }
            FieldType::List(inner) => write!(f, "list of {}", inner),
            FieldType::Target => write!(f, "mapping with {}", node::TARGET_KEY),
            FieldType::Any => write!(f, "any value"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

impl FieldSpec {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }
}

/// Looks up a field by name.
pub fn find<'s>(schema: &'s [FieldSpec], name: &str) -> Option<&'s FieldSpec> {
    schema.iter().find(|spec| spec.name == name)
}

/// Checks the mapping at `path` against `schema` and returns the accepted
/// fields, `_target_` excluded.
///
/// Unknown keys fail with [`ConfigError::UnknownOption`] when strict and are
/// dropped with a warning when lenient. Errors carry the key's origin.
pub fn check_fields(
    path: &str,
    map: &Mapping,
    schema: &[FieldSpec],
    origins: &Origins,
    strictness: Strictness,
) -> Result<Mapping> {
    let mut fields = Mapping::new();
    for (key, value) in map {
        let name = match key.as_str() {
            Some(TARGET_KEY) => continue,
            Some(name) => name,
            None => {
                return Err(ConfigError::TypeMismatch {
                    field: path.to_string(),
                    origin: origins.of(path).to_string(),
                    expected: "string keys".to_string(),
                    found: node::describe(key),
                })
            }
        };
        let field = join_path(path, name);
        let spec = match find(schema, name) {
            Some(spec) => spec,
            None => match strictness {
                Strictness::Strict => {
                    return Err(ConfigError::UnknownOption {
                        origin: origins.of(&field).to_string(),
                        field,
                    })
                }
                Strictness::Lenient => {
                    log::warn!(
                        "Ignoring unknown option <{}> (from {})",
                        field,
                        origins.of(&field)
                    );
                    continue;
                }
            },
        };
        if !spec.ty.accepts(value) {
            return Err(ConfigError::TypeMismatch {
                origin: origins.of(&field).to_string(),
                field,
                expected: spec.ty.to_string(),
                found: node::describe(value),
            });
        }
        fields.insert(key.clone(), value.clone());
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICES: FieldType = FieldType::Auto(&FieldType::OneOf(&[
        FieldType::Int,
        FieldType::List(&FieldType::Int),
        FieldType::Str,
    ]));

    fn yaml(src: &str) -> Value {
        serde_yaml::from_str(src).unwrap()
    }

    #[test]
    fn accepts_declared_domains() {
        assert!(DEVICES.accepts(&yaml("auto")));
        assert!(DEVICES.accepts(&yaml("2")));
        assert!(DEVICES.accepts(&yaml("[0, 1]")));
        assert!(!DEVICES.accepts(&yaml("1.5")));
        assert!(!DEVICES.accepts(&yaml("null")));

        let limit = FieldType::Nullable(&FieldType::Float);
        assert!(limit.accepts(&yaml("null")));
        assert!(limit.accepts(&yaml("10")));
        assert!(limit.accepts(&yaml("0.25")));
        assert!(!limit.accepts(&yaml("\"all\"")));

        assert!(!FieldType::Int.accepts(&yaml("1.0")));
        assert!(FieldType::UInt.accepts(&yaml("0")));
        assert!(!FieldType::UInt.accepts(&yaml("-1")));
        assert!(FieldType::Enum(&["norm", "value"]).accepts(&yaml("norm")));
        assert!(!FieldType::Enum(&["norm", "value"]).accepts(&yaml("l2")));
        assert!(FieldType::Target.accepts(&yaml("{_target_: profiler.simple}")));
    }

    #[test]
    fn displays_expected_domain() {
        assert_eq!(
            FieldType::Nullable(&FieldType::Enum(&["norm", "value"])).to_string(),
            "null or one of [norm, value]"
        );
    }

    const FLAGS: &[FieldSpec] = &[
        FieldSpec::new("print_config", FieldType::Bool),
        FieldSpec::new("workers", FieldType::UInt),
    ];

    #[test]
    fn check_fields_reports_the_offending_key() {
        let composed = crate::compose::Composed::new(
            yaml("extras:\n  print_confg: true\n  workers: -2\n"),
            "extras/default.yaml",
        );
        let map = node::get_path(&composed.value, "extras")
            .and_then(Value::as_mapping)
            .unwrap();

        let err = check_fields("extras", map, FLAGS, &composed.origins, Strictness::Strict)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { ref field, ref origin }
            if field == "extras.print_confg" && origin == "extras/default.yaml"));

        let err = check_fields("extras", map, FLAGS, &composed.origins, Strictness::Lenient)
            .unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { ref field, .. } if field == "extras.workers"));
    }

    #[test]
    fn lenient_check_drops_unknown_keys() {
        let composed = crate::compose::Composed::new(yaml("print_confg: true\nworkers: 2\n"), "x.yaml");
        let map = composed.value.as_mapping().unwrap();
        let fields = check_fields("", map, FLAGS, &composed.origins, Strictness::Lenient).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("workers"), Some(&Value::from(2)));
    }
}
