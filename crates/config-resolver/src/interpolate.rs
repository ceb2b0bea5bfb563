//! `${...}` interpolation.
//!
//! - `${paths.output_dir}` looks up another key by absolute dotted path.
//! - `${name:arg1,arg2}` calls a resolver from an explicit [`Resolvers`]
//!   table. Arguments may contain interpolations themselves.
//!
//! A string made of exactly one interpolation takes the type of the value it
//! points at; otherwise every interpolation is rendered into the string.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde_yaml::{Mapping, Value};

use crate::compose::{Composed, Origins};
use crate::error::{ConfigError, Result};
use crate::node::{self, join_path};

const OPEN: &str = "${";

pub type ResolverFn = dyn Fn(&[Value]) -> std::result::Result<Value, String>;

/// Named resolver functions available to `${name:...}` expressions.
pub struct Resolvers {
    table: BTreeMap<String, Box<ResolverFn>>,
}

impl Resolvers {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// `oc.env` and `join_string_underscore`.
    pub fn standard() -> Self {
        let mut resolvers = Self::new();
        resolvers.register("oc.env", env_resolver);
        resolvers.register("join_string_underscore", join_string_underscore);
        resolvers
    }

    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + 'static,
    {
        if self.table.insert(name.to_string(), Box::new(f)).is_some() {
            log::warn!("Resolver <{}> registered twice, keeping the last one", name);
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    fn call(&self, name: &str, args: &[Value]) -> Option<std::result::Result<Value, String>> {
        self.table.get(name).map(|f| f(args))
    }
}

impl Default for Resolvers {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.table.keys()).finish()
    }
}

fn env_resolver(args: &[Value]) -> std::result::Result<Value, String> {
    let name = args
        .first()
        .and_then(node::scalar_to_string)
        .ok_or_else(|| "oc.env expects a variable name".to_string())?;
    match std::env::var(&name) {
        Ok(value) => Ok(Value::String(value)),
        Err(_) => match args.get(1) {
            Some(default) => Ok(default.clone()),
            None => Err(format!("environment variable `{}` is not set", name)),
        },
    }
}

fn join_string_underscore(args: &[Value]) -> std::result::Result<Value, String> {
    let mut parts = Vec::new();
    for arg in args {
        match arg {
            Value::Sequence(items) => {
                for item in items {
                    parts.push(
                        node::scalar_to_string(item)
                            .ok_or_else(|| "cannot join nested collections".to_string())?,
                    );
                }
            }
            other => parts.push(
                node::scalar_to_string(other)
                    .ok_or_else(|| "cannot join a mapping".to_string())?,
            ),
        }
    }
    Ok(Value::String(parts.join("_")))
}

/// A composed tree with every interpolation substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: Value,
    pub origins: Origins,
}

impl Resolved {
    pub fn get(&self, path: &str) -> Option<&Value> {
        node::get_path(&self.value, path)
    }

    pub fn origin(&self, path: &str) -> &str {
        self.origins.of(path)
    }
}

/// Substitutes every interpolation in `composed`.
pub fn resolve(composed: Composed, resolvers: &Resolvers) -> Result<Resolved> {
    let value = {
        let mut interpolator = Interpolator {
            root: &composed.value,
            origins: &composed.origins,
            resolvers,
            stack: Vec::new(),
            cache: HashMap::new(),
        };
        interpolator.resolve_node("", &composed.value)?
    };
    Ok(Resolved {
        value,
        origins: composed.origins,
    })
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Expr(&'a str),
}

/// Splits a string into literal text and `${...}` bodies.
fn segments(s: &str) -> std::result::Result<Vec<Segment<'_>>, String> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            out.push(Segment::Text(&rest[..start]));
        }
        let body_start = start + OPEN.len();
        let end = matching_brace(&rest[body_start..])
            .ok_or_else(|| format!("unterminated interpolation in {:?}", s))?;
        out.push(Segment::Expr(&rest[body_start..body_start + end]));
        rest = &rest[body_start + end + 1..];
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    Ok(out)
}

/// Byte offset of the `}` closing an interpolation body.
fn matching_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Splits resolver arguments on commas outside nested brackets.
fn split_args(args: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&args[start..]);
    out
}

struct Interpolator<'a> {
    root: &'a Value,
    origins: &'a Origins,
    resolvers: &'a Resolvers,
    stack: Vec<String>,
    /// Resolved strings by path; each key is evaluated once per run.
    cache: HashMap<String, Value>,
}

impl<'a> Interpolator<'a> {
    fn error(&self, field: &str, reference: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::Resolution {
            field: field.to_string(),
            reference: reference.to_string(),
            origin: self.origins.of(field).to_string(),
            reason: reason.into(),
        }
    }

    fn resolve_node(&mut self, path: &str, node: &Value) -> Result<Value> {
        match node {
            Value::String(s) if s.contains(OPEN) => {
                if let Some(value) = self.cache.get(path) {
                    return Ok(value.clone());
                }
                let value = self.resolve_string(path, s)?;
                self.cache.insert(path.to_string(), value.clone());
                Ok(value)
            }
            Value::Mapping(map) => {
                let mut out = Mapping::with_capacity(map.len());
                for (key, child) in map {
                    let child_path = match key.as_str() {
                        Some(key) => join_path(path, key),
                        None => path.to_string(),
                    };
                    out.insert(key.clone(), self.resolve_node(&child_path, child)?);
                }
                Ok(Value::Mapping(out))
            }
            Value::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.resolve_node(&join_path(path, &i.to_string()), item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&mut self, field: &str, s: &str) -> Result<Value> {
        let parts = segments(s).map_err(|reason| self.error(field, s, reason))?;
        if let [Segment::Expr(expr)] = parts.as_slice() {
            return self.eval(field, expr);
        }

        let mut out = String::new();
        for part in parts {
            match part {
                Segment::Text(text) => out.push_str(text),
                Segment::Expr(expr) => {
                    let value = self.eval(field, expr)?;
                    let text = node::scalar_to_string(&value).ok_or_else(|| {
                        self.error(
                            field,
                            expr,
                            format!("cannot embed {} in a string", node::describe(&value)),
                        )
                    })?;
                    out.push_str(&text);
                }
            }
        }
        Ok(Value::String(out))
    }

    fn eval(&mut self, field: &str, expr: &str) -> Result<Value> {
        let expr = expr.trim();
        match resolver_call(expr) {
            Some((name, raw_args)) => {
                let mut args = Vec::new();
                if !raw_args.trim().is_empty() {
                    for raw in split_args(raw_args) {
                        args.push(self.eval_arg(field, raw.trim())?);
                    }
                }
                match self.resolvers.call(name, &args) {
                    Some(Ok(value)) => Ok(value),
                    Some(Err(reason)) => Err(self.error(field, expr, reason)),
                    None => Err(self.error(field, expr, format!("unknown resolver `{}`", name))),
                }
            }
            None => self.lookup(field, expr),
        }
    }

    fn eval_arg(&mut self, field: &str, raw: &str) -> Result<Value> {
        if raw.contains(OPEN) {
            return self.resolve_string(field, raw);
        }
        let raw = raw.trim_matches(|c| c == '"' || c == '\'');
        Ok(serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
    }

    fn lookup(&mut self, field: &str, key: &str) -> Result<Value> {
        if key.is_empty() || key.starts_with('.') {
            return Err(self.error(field, key, "only absolute key paths are supported"));
        }
        if self.stack.iter().any(|k| k == key) {
            let chain = format!("{} -> {}", self.stack.join(" -> "), key);
            return Err(self.error(field, key, format!("interpolation cycle: {}", chain)));
        }
        let target = node::get_path(self.root, key)
            .ok_or_else(|| self.error(field, key, "undefined reference"))?;

        self.stack.push(key.to_string());
        let value = self.resolve_node(key, target);
        self.stack.pop();
        value
    }
}

/// Splits `name:args` when `expr` is a resolver call.
fn resolver_call(expr: &str) -> Option<(&str, &str)> {
    let colon = expr.find(':')?;
    // a `${` before the colon means the colon belongs to a nested call
    if expr[..colon].contains(OPEN) {
        return None;
    }
    Some((&expr[..colon], &expr[colon + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_yaml(src: &str) -> Result<Resolved> {
        let value: Value = serde_yaml::from_str(src).unwrap();
        resolve(Composed::new(value, "test.yaml"), &Resolvers::standard())
    }

    #[test]
    fn output_dir_interpolates_to_the_literal_value() {
        let resolved = resolve_yaml(
            "paths:\n  output_dir: X\ntrainer:\n  default_root_dir: ${paths.output_dir}\n",
        )
        .unwrap();
        assert_eq!(resolved.get("trainer.default_root_dir"), Some(&Value::from("X")));
    }

    #[test]
    fn undefined_namespace_is_a_resolution_error() {
        let err = resolve_yaml("trainer:\n  default_root_dir: ${paths.output_dir}\n").unwrap_err();
        match err {
            ConfigError::Resolution {
                field,
                reference,
                origin,
                ..
            } => {
                assert_eq!(field, "trainer.default_root_dir");
                assert_eq!(reference, "paths.output_dir");
                assert_eq!(origin, "test.yaml");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn whole_string_reference_keeps_type_and_chains() {
        let resolved = resolve_yaml("a: 3\nb: ${a}\nc: ${b}\nd: run_${c}\n").unwrap();
        assert_eq!(resolved.get("c"), Some(&Value::from(3)));
        assert_eq!(resolved.get("d"), Some(&Value::from("run_3")));
    }

    #[test]
    fn each_key_is_evaluated_once() {
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = calls.clone();
        let mut resolvers = Resolvers::new();
        resolvers.register("tick", move |_| {
            counter.set(counter.get() + 1);
            Ok(Value::from(counter.get()))
        });
        let value: Value = serde_yaml::from_str("a: ${tick:}\nb: ${a}\nc: x${a}\n").unwrap();
        let resolved = resolve(Composed::new(value, "test.yaml"), &resolvers).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(resolved.get("b"), Some(&Value::from(1)));
        assert_eq!(resolved.get("c"), Some(&Value::from("x1")));
    }

    #[test]
    fn cycles_are_reported() {
        let err = resolve_yaml("a: ${b}\nb: ${a}\n").unwrap_err();
        assert!(matches!(err, ConfigError::Resolution { ref reason, .. } if reason.contains("cycle")));
    }

    #[test]
    fn resolvers_take_nested_arguments() {
        let resolved = resolve_yaml(
            "tags: [dev, gpu]\nname: ${join_string_underscore:${tags}}\nroot: ${oc.env:SURELY_UNSET_VARIABLE_42,/tmp}\n",
        )
        .unwrap();
        assert_eq!(resolved.get("name"), Some(&Value::from("dev_gpu")));
        assert_eq!(resolved.get("root"), Some(&Value::from("/tmp")));
    }

    #[test]
    fn missing_env_without_default_fails() {
        let err = resolve_yaml("root: ${oc.env:SURELY_UNSET_VARIABLE_42}\n").unwrap_err();
        assert!(matches!(err, ConfigError::Resolution { .. }));
    }

    #[test]
    fn unknown_resolver_fails() {
        let err = resolve_yaml("x: ${nope:1}\n").unwrap_err();
        assert!(matches!(err, ConfigError::Resolution { ref reason, .. } if reason.contains("nope")));
    }

    #[test]
    fn embedding_a_mapping_fails() {
        let err = resolve_yaml("a: {b: 1}\nc: x_${a}\n").unwrap_err();
        assert!(matches!(err, ConfigError::Resolution { .. }));
    }

    #[test]
    fn unterminated_interpolation_fails() {
        assert!(resolve_yaml("a: ${b\nb: 1\n").is_err());
    }

    #[test]
    fn segments_split_text_and_expressions() {
        assert_eq!(
            segments("${a}/x/${b:${c}}").unwrap(),
            vec![Segment::Expr("a"), Segment::Text("/x/"), Segment::Expr("b:${c}")]
        );
        assert_eq!(split_args("a, [1, 2], ${x:y,z}"), vec!["a", " [1, 2]", " ${x:y,z}"]);
    }
}
