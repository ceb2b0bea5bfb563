//! Explicit factory tables mapping `_target_` names to builders.
//!
//! A registry is owned by the application; nothing is registered globally.
//! Instantiation checks the node against the target's schema, then hands
//! the fields to the builder through [`Args`]. Builders instantiate nested
//! targets first with [`Args::nested`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::error::{ConfigError, Result};
use crate::interpolate::Resolved;
use crate::node::{self, join_path, TARGET_KEY};
use crate::schema::{self, FieldSpec};
use crate::Strictness;

pub type Builder<T, C> = fn(Args<'_>, &C) -> Result<T>;

struct Entry<T, C> {
    schema: &'static [FieldSpec],
    build: Builder<T, C>,
}

/// Named builders producing `T`, with context `C` handed to each builder.
pub struct Registry<T, C = ()> {
    kind: &'static str,
    entries: BTreeMap<&'static str, Entry<T, C>>,
    strictness: Strictness,
}

impl<T, C> Registry<T, C> {
    /// `kind` names what the registry builds in log lines ("callback").
    pub fn new(kind: &'static str, strictness: Strictness) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
            strictness,
        }
    }

    pub fn register(
        &mut self,
        name: &'static str,
        schema: &'static [FieldSpec],
        build: Builder<T, C>,
    ) -> &mut Self {
        self.entries.insert(name, Entry { schema, build });
        self
    }

    /// Builds the target declared at `path`.
    pub fn instantiate(&self, cfg: &Resolved, path: &str, ctx: &C) -> Result<T> {
        let section = cfg.get(path).ok_or_else(|| ConfigError::Resolution {
            field: path.to_string(),
            reference: path.to_string(),
            origin: cfg.origin(path).to_string(),
            reason: "missing section".to_string(),
        })?;
        let map = section.as_mapping().ok_or_else(|| ConfigError::TypeMismatch {
            field: path.to_string(),
            origin: cfg.origin(path).to_string(),
            expected: format!("{} mapping with {}", self.kind, TARGET_KEY),
            found: node::describe(section),
        })?;
        let target = node::target_of(section).ok_or_else(|| ConfigError::TypeMismatch {
            field: join_path(path, TARGET_KEY),
            origin: cfg.origin(path).to_string(),
            expected: "string".to_string(),
            found: map
                .get(TARGET_KEY)
                .map(node::describe)
                .unwrap_or_else(|| "nothing".to_string()),
        })?;
        let entry = self
            .entries
            .get(target)
            .ok_or_else(|| ConfigError::UnknownTarget {
                field: path.to_string(),
                target: target.to_string(),
            })?;

        let fields = schema::check_fields(path, map, entry.schema, &cfg.origins, self.strictness)?;
        log::info!("Building {} <{}>...", self.kind, target);
        let built = (entry.build)(
            Args {
                cfg,
                path: path.to_string(),
                fields,
            },
            ctx,
        )?;
        log::info!("Building {} <{}>...DONE!", self.kind, target);
        Ok(built)
    }

    /// Builds every child of the section at `path` that carries
    /// `_target_`. An absent or null section builds nothing.
    pub fn instantiate_all(&self, cfg: &Resolved, path: &str, ctx: &C) -> Result<Vec<T>> {
        let map = match cfg.get(path) {
            None | Some(Value::Null) => {
                log::info!("No {} configs under <{}>. Skipping...", self.kind, path);
                return Ok(Vec::new());
            }
            Some(Value::Mapping(map)) => map,
            Some(other) => {
                return Err(ConfigError::TypeMismatch {
                    field: path.to_string(),
                    origin: cfg.origin(path).to_string(),
                    expected: "mapping".to_string(),
                    found: node::describe(other),
                })
            }
        };

        let mut built = Vec::new();
        for (key, child) in map {
            let key = match key.as_str() {
                Some(key) => key,
                None => continue,
            };
            if node::target_of(child).is_some() {
                built.push(self.instantiate(cfg, &join_path(path, key), ctx)?);
            }
        }
        Ok(built)
    }
}

/// Schema-checked fields of one target node.
pub struct Args<'a> {
    cfg: &'a Resolved,
    path: String,
    fields: Mapping,
}

impl<'a> Args<'a> {
    /// Dotted path of the node being built.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn mismatch(&self, field: &str, expected: &str, err: serde_yaml::Error) -> ConfigError {
        ConfigError::TypeMismatch {
            origin: self.cfg.origin(field).to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
            found: err.to_string(),
        }
    }

    /// Removes and deserializes one field; `None` when it is absent.
    pub fn take<D: DeserializeOwned>(&mut self, name: &str) -> Result<Option<D>> {
        match self.fields.shift_remove(name) {
            None => Ok(None),
            Some(value) => {
                let field = join_path(&self.path, name);
                serde_yaml::from_value(value)
                    .map(Some)
                    .map_err(|err| self.mismatch(&field, std::any::type_name::<D>(), err))
            }
        }
    }

    /// Removes a nested target field and instantiates it with `registry`.
    /// A null or absent field yields `None`.
    pub fn nested<U, D>(&mut self, name: &str, registry: &Registry<U, D>, ctx: &D) -> Result<Option<U>> {
        match self.fields.shift_remove(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => registry
                .instantiate(self.cfg, &join_path(&self.path, name), ctx)
                .map(Some),
        }
    }

    /// Deserializes the remaining fields into `D`.
    ///
    /// A value the schema let through but `D` rejects is reported against
    /// the key that holds it.
    pub fn into_typed<D: DeserializeOwned>(self) -> Result<D> {
        match serde_yaml::from_value(Value::Mapping(self.fields.clone())) {
            Ok(typed) => Ok(typed),
            Err(err) => {
                // a missing field belongs to the node, not to any key in it
                let field = if err.to_string().contains("missing field") {
                    self.path.clone()
                } else {
                    self.failing_field::<D>()
                };
                Err(self.mismatch(&field, std::any::type_name::<D>(), err))
            }
        }
    }

    /// Path of the first field that `D` cannot take, or the node itself.
    fn failing_field<D: DeserializeOwned>(&self) -> String {
        // with every field defaulted, each key can be tried on its own;
        // otherwise look for the key whose removal leaves at most that key
        // missing
        let all_default = serde_yaml::from_value::<D>(Value::Mapping(Mapping::new())).is_ok();
        for (key, value) in &self.fields {
            let name = match key.as_str() {
                Some(name) => name,
                None => continue,
            };
            let failing = if all_default {
                let mut single = Mapping::new();
                single.insert(key.clone(), value.clone());
                serde_yaml::from_value::<D>(Value::Mapping(single)).is_err()
            } else {
                let mut rest = self.fields.clone();
                rest.shift_remove(key);
                match serde_yaml::from_value::<D>(Value::Mapping(rest)) {
                    Ok(_) => true,
                    Err(err) => err.to_string().contains(&format!("missing field `{}`", name)),
                }
            };
            if failing {
                return join_path(&self.path, name);
            }
        }
        self.path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Composed;
    use crate::interpolate::{resolve, Resolvers};
    use crate::schema::FieldType;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Leaf {
        #[serde(default)]
        size: i64,
    }

    #[derive(Debug, PartialEq)]
    struct Parent {
        name: String,
        child: Option<Leaf>,
    }

    struct Ctx {
        leaves: Registry<Leaf, Ctx>,
    }

    const LEAF_SCHEMA: &[FieldSpec] = &[FieldSpec::new("size", FieldType::Int)];
    const PARENT_SCHEMA: &[FieldSpec] = &[
        FieldSpec::new("name", FieldType::Str),
        FieldSpec::new("child", FieldType::Nullable(&FieldType::Target)),
    ];

    fn build_leaf(args: Args<'_>, _: &Ctx) -> Result<Leaf> {
        args.into_typed()
    }

    fn build_parent(mut args: Args<'_>, ctx: &Ctx) -> Result<Parent> {
        let child = args.nested("child", &ctx.leaves, ctx)?;
        let name = args.take("name")?.unwrap_or_default();
        Ok(Parent { name, child })
    }

    fn setup(strictness: Strictness) -> (Registry<Parent, Ctx>, Ctx) {
        let mut leaves: Registry<Leaf, Ctx> = Registry::new("leaf", strictness);
        leaves.register("leaf", LEAF_SCHEMA, build_leaf);
        let mut parents: Registry<Parent, Ctx> = Registry::new("parent", strictness);
        parents.register("parent", PARENT_SCHEMA, build_parent);
        (parents, Ctx { leaves })
    }

    fn resolved(src: &str) -> Resolved {
        let value: Value = serde_yaml::from_str(src).unwrap();
        resolve(Composed::new(value, "test.yaml"), &Resolvers::new()).unwrap()
    }

    #[test]
    fn nested_targets_are_built_first() {
        let (parents, ctx) = setup(Strictness::Strict);
        let cfg = resolved("p:\n  _target_: parent\n  name: top\n  child:\n    _target_: leaf\n    size: 4\n");
        let parent = parents.instantiate(&cfg, "p", &ctx).unwrap();
        assert_eq!(
            parent,
            Parent {
                name: "top".to_string(),
                child: Some(Leaf { size: 4 })
            }
        );
    }

    #[test]
    fn null_nested_target_is_none() {
        let (parents, ctx) = setup(Strictness::Strict);
        let cfg = resolved("p:\n  _target_: parent\n  name: top\n  child: null\n");
        assert_eq!(parents.instantiate(&cfg, "p", &ctx).unwrap().child, None);
    }

    #[test]
    fn unknown_option_strict_rejects_lenient_ignores() {
        let cfg = resolved("p:\n  _target_: parent\n  name: top\n  colour: red\n");

        let (parents, ctx) = setup(Strictness::Strict);
        let err = parents.instantiate(&cfg, "p", &ctx).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { ref field, ref origin }
            if field == "p.colour" && origin == "test.yaml"));

        let (parents, ctx) = setup(Strictness::Lenient);
        assert_eq!(parents.instantiate(&cfg, "p", &ctx).unwrap().name, "top");
    }

    #[test]
    fn declared_type_is_enforced() {
        let (parents, ctx) = setup(Strictness::Strict);
        let cfg = resolved("p:\n  _target_: parent\n  name: top\n  child:\n    _target_: leaf\n    size: big\n");
        let err = parents.instantiate(&cfg, "p", &ctx).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { ref field, .. } if field == "p.child.size"));
    }

    #[test]
    fn unknown_target_is_reported() {
        let (parents, ctx) = setup(Strictness::Strict);
        let cfg = resolved("p:\n  _target_: nobody\n");
        let err = parents.instantiate(&cfg, "p", &ctx).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTarget { ref target, .. } if target == "nobody"));
    }

    #[test]
    fn instantiate_all_skips_plain_entries_and_missing_sections() {
        let (_, ctx) = setup(Strictness::Strict);
        let cfg = resolved("leaves:\n  a:\n    _target_: leaf\n    size: 1\n  note: hello\n  b:\n    _target_: leaf\n");
        let built = ctx.leaves.instantiate_all(&cfg, "leaves", &ctx).unwrap();
        assert_eq!(built, vec![Leaf { size: 1 }, Leaf { size: 0 }]);
        assert!(ctx.leaves.instantiate_all(&cfg, "absent", &ctx).unwrap().is_empty());
    }

    #[allow(dead_code)]
    #[derive(Debug, Deserialize)]
    struct Counts {
        #[serde(default)]
        label: String,
        #[serde(default)]
        n: u32,
    }

    #[allow(dead_code)]
    #[derive(Debug, Deserialize)]
    struct Required {
        label: String,
        n: u32,
    }

    const COUNTS_SCHEMA: &[FieldSpec] = &[
        FieldSpec::new("label", FieldType::Str),
        FieldSpec::new("n", FieldType::Int),
    ];

    fn build_counts(args: Args<'_>, _: &()) -> Result<Counts> {
        args.into_typed()
    }

    fn build_required(args: Args<'_>, _: &()) -> Result<Required> {
        args.into_typed()
    }

    #[test]
    fn typed_failure_names_the_failing_key() {
        let mut composed = Composed::new(
            serde_yaml::from_str("p:\n  _target_: counts\n  label: a\n  n: 3\n").unwrap(),
            "test.yaml",
        );
        crate::node::set_path(&mut composed.value, "p.n", Value::from(-1));
        composed.origins.record("p.n", "command line");
        let cfg = resolve(composed, &Resolvers::new()).unwrap();

        let mut counts: Registry<Counts> = Registry::new("counts", Strictness::Strict);
        counts.register("counts", COUNTS_SCHEMA, build_counts);
        let err = counts.instantiate(&cfg, "p", &()).unwrap_err();
        assert!(
            matches!(err, ConfigError::TypeMismatch { ref field, ref origin, .. }
                if field == "p.n" && origin == "command line"),
            "{err}"
        );

        let mut required: Registry<Required> = Registry::new("required", Strictness::Strict);
        required.register("counts", COUNTS_SCHEMA, build_required);
        let err = required.instantiate(&cfg, "p", &()).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { ref field, .. } if field == "p.n"), "{err}");
    }

    #[test]
    fn missing_required_field_names_the_node() {
        let cfg = resolved("p:\n  _target_: counts\n  label: a\n");
        let mut required: Registry<Required> = Registry::new("required", Strictness::Strict);
        required.register("counts", COUNTS_SCHEMA, build_required);
        let err = required.instantiate(&cfg, "p", &()).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { ref field, .. } if field == "p"), "{err}");
    }
}
