//! Command-line overrides in `key=value` form.
//!
//! | Syntax          | Effect                                   |
//! |-----------------|------------------------------------------|
//! | `a.b=value`     | set an existing key                      |
//! | `+a.b=value`    | add a key that must not exist yet        |
//! | `++a.b=value`   | set the key, adding it if needed         |
//! | `~a.b`          | delete the key                           |
//! | `group=option`  | pick another option for a config group   |

use serde_yaml::Value;

use crate::compose::Composed;
use crate::error::{ConfigError, Result};
use crate::loader::{ConfigSource, GroupChoices};
use crate::node;
use crate::Strictness;

pub const COMMAND_LINE: &str = "command line";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKind {
    Set,
    Add,
    ForceAdd,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub kind: OverrideKind,
    pub key: String,
    pub value: Value,
    /// The override as typed, kept for error messages.
    pub input: String,
}

impl Override {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigError::InvalidOverride {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if let Some(key) = input.strip_prefix('~') {
            let key = key.split('=').next().unwrap_or_default().trim();
            if key.is_empty() {
                return Err(invalid("missing key"));
            }
            return Ok(Self {
                kind: OverrideKind::Delete,
                key: key.to_string(),
                value: Value::Null,
                input: input.to_string(),
            });
        }

        let (kind, rest) = if let Some(rest) = input.strip_prefix("++") {
            (OverrideKind::ForceAdd, rest)
        } else if let Some(rest) = input.strip_prefix('+') {
            (OverrideKind::Add, rest)
        } else {
            (OverrideKind::Set, input)
        };

        let (key, raw) = rest.split_once('=').ok_or_else(|| invalid("expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid("missing key"));
        }
        Ok(Self {
            kind,
            key: key.to_string(),
            value: parse_value(raw),
            input: input.to_string(),
        })
    }

    fn is_group_choice(&self, source: &ConfigSource) -> bool {
        self.kind == OverrideKind::Set && !self.key.contains('.') && source.is_group(&self.key)
    }

    fn apply(&self, composed: &mut Composed, strictness: Strictness) -> Result<()> {
        let exists = node::get_path(&composed.value, &self.key).is_some();
        match self.kind {
            OverrideKind::Delete => {
                if node::remove_path(&mut composed.value, &self.key).is_none() {
                    return Err(ConfigError::InvalidOverride {
                        input: self.input.clone(),
                        reason: format!("cannot delete missing key `{}`", self.key),
                    });
                }
                composed.origins.record(&self.key, COMMAND_LINE);
                return Ok(());
            }
            OverrideKind::Add if exists => {
                return Err(ConfigError::InvalidOverride {
                    input: self.input.clone(),
                    reason: format!("`{}` already exists, use ++ to replace it", self.key),
                });
            }
            OverrideKind::Set if !exists => match strictness {
                Strictness::Strict => {
                    return Err(ConfigError::UnknownOption {
                        field: self.key.clone(),
                        origin: COMMAND_LINE.to_string(),
                    })
                }
                Strictness::Lenient => {
                    log::warn!("Adding unknown option <{}> from the command line", self.key);
                }
            },
            _ => {}
        }
        node::set_path(&mut composed.value, &self.key, self.value.clone());
        composed.origins.record(&self.key, COMMAND_LINE);
        Ok(())
    }
}

/// Parses an override value as YAML, falling back to the raw string.
fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::String(String::new());
    }
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parses overrides and splits group choices from value overrides.
pub fn split_overrides(
    inputs: &[String],
    source: &ConfigSource,
) -> Result<(GroupChoices, Vec<Override>)> {
    let mut choices = GroupChoices::new();
    let mut values = Vec::new();
    for input in inputs {
        let parsed = Override::parse(input)?;
        if parsed.is_group_choice(source) {
            let choice = match &parsed.value {
                Value::Null => None,
                Value::String(option) => Some(option.clone()),
                other => {
                    return Err(ConfigError::InvalidOverride {
                        input: input.clone(),
                        reason: format!("group option must be a name, found {}", node::describe(other)),
                    })
                }
            };
            choices.insert(parsed.key, choice);
        } else {
            values.push(parsed);
        }
    }
    Ok((choices, values))
}

/// Applies value overrides in order on top of a composed tree.
pub fn apply_overrides(
    composed: &mut Composed,
    overrides: &[Override],
    strictness: Strictness,
) -> Result<()> {
    for o in overrides {
        log::debug!("Applying override {}", o.input);
        o.apply(composed, strictness)?;
    }
    Ok(())
}
