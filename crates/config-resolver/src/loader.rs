//! Reads YAML config files and expands their `defaults` lists into an
//! ordered list of fragments.
//!
//! A config directory looks like:
//!
//! ```text
//! configs/
//!   train.yaml              primary config
//!   trainer/default.yaml    group `trainer`, option `default`
//!   trainer/profiler/*.yaml nested group `trainer/profiler`
//! ```
//!
//! Defaults list entries:
//! - `_self_`: the file's own body; appended last when omitted
//! - `name`: another option of the same group, merged at the same package
//! - `group: option`: `<group>/<option>.yaml` merged at package `group`;
//!   a `null` option contributes nothing

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::compose::{self, Composed, Fragment};
use crate::error::{ConfigError, Result};

const DEFAULTS_KEY: &str = "defaults";
const SELF_ENTRY: &str = "_self_";

/// Group choices that replace the option named in a defaults list,
/// keyed by group path (`trainer/profiler`). `None` disables the group.
pub type GroupChoices = BTreeMap<String, Option<String>>;

pub struct ConfigSource {
    root: PathBuf,
}

impl ConfigSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `group` (e.g. `trainer/profiler`) is a directory of options.
    pub fn is_group(&self, group: &str) -> bool {
        !group.is_empty() && self.root.join(group).is_dir()
    }

    /// Expands the primary config `name` into fragments in merge order.
    pub fn load(&self, name: &str, choices: &GroupChoices) -> Result<Vec<Fragment>> {
        let mut out = Vec::new();
        let mut used = Vec::new();
        let mut stack = Vec::new();
        self.expand(None, name, "", choices, &mut used, &mut stack, &mut out)?;

        if let Some(group) = choices.keys().find(|group| !used.contains(group)) {
            return Err(ConfigError::InvalidOverride {
                input: group.clone(),
                reason: format!("group `{}` is not in the defaults list of `{}`", group, name),
            });
        }
        Ok(out)
    }

    /// Loads and composes the primary config `name`.
    pub fn compose(&self, name: &str, choices: &GroupChoices) -> Result<Composed> {
        let fragments = self.load(name, choices)?;
        Ok(compose::compose(compose::empty(), &fragments))
    }

    fn file_path(&self, group: Option<&str>, name: &str) -> PathBuf {
        let file = format!("{}.yaml", name);
        match group {
            Some(group) => self.root.join(group).join(file),
            None => self.root.join(file),
        }
    }

    fn read(&self, path: &Path, label: &str) -> Result<Value> {
        if !path.is_file() {
            return Err(ConfigError::MissingConfig {
                name: label.to_string(),
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        // an empty file is an empty mapping
        Ok(if value.is_null() { compose::empty() } else { value })
    }

    #[allow(clippy::too_many_arguments)]
    fn expand(
        &self,
        group: Option<&str>,
        name: &str,
        package: &str,
        choices: &GroupChoices,
        used: &mut Vec<String>,
        stack: &mut Vec<String>,
        out: &mut Vec<Fragment>,
    ) -> Result<()> {
        let label = match group {
            Some(group) => format!("{}/{}.yaml", group, name),
            None => format!("{}.yaml", name),
        };
        if stack.contains(&label) {
            return Err(ConfigError::InvalidDefaults {
                origin: label,
                reason: format!("recursive include via {}", stack.join(" -> ")),
            });
        }

        let mut body = self.read(&self.file_path(group, name), &label)?;
        let entries = match body.as_mapping_mut() {
            Some(map) => map.shift_remove(DEFAULTS_KEY),
            None => None,
        };
        let entries = match entries {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(entries)) => entries,
            Some(other) => {
                return Err(ConfigError::InvalidDefaults {
                    origin: label,
                    reason: format!("expected a list, found {}", crate::node::describe(&other)),
                })
            }
        };

        stack.push(label.clone());
        let self_fragment = Fragment::new(label.clone(), package, body);
        let mut self_emitted = false;

        for entry in entries {
            match entry {
                Value::String(entry) if entry == SELF_ENTRY => {
                    out.push(self_fragment.clone());
                    self_emitted = true;
                }
                Value::String(sibling) => {
                    self.expand(group, &sibling, package, choices, used, stack, out)?;
                }
                Value::Mapping(map) if map.len() == 1 => {
                    let (key, option) = map.into_iter().next().ok_or_else(|| {
                        ConfigError::InvalidDefaults {
                            origin: label.clone(),
                            reason: "empty entry".to_string(),
                        }
                    })?;
                    let key = key.as_str().ok_or_else(|| ConfigError::InvalidDefaults {
                        origin: label.clone(),
                        reason: "group names must be strings".to_string(),
                    })?;
                    let subgroup = match group {
                        Some(group) => format!("{}/{}", group, key),
                        None => key.to_string(),
                    };
                    let option = match choices.get(&subgroup) {
                        Some(choice) => {
                            used.push(subgroup.clone());
                            choice.clone()
                        }
                        None => match option {
                            Value::Null => None,
                            Value::String(option) => Some(option),
                            other => {
                                return Err(ConfigError::InvalidDefaults {
                                    origin: label,
                                    reason: format!(
                                        "option for `{}` must be a name or null, found {}",
                                        key,
                                        crate::node::describe(&other)
                                    ),
                                })
                            }
                        },
                    };
                    match option {
                        Some(option) => {
                            let subpackage = crate::node::join_path(package, key);
                            log::debug!("Selected {}={} from {}", subgroup, option, label);
                            self.expand(Some(&subgroup), &option, &subpackage, choices, used, stack, out)?;
                        }
                        None => log::debug!("Group {} disabled in {}", subgroup, label),
                    }
                }
                other => {
                    return Err(ConfigError::InvalidDefaults {
                        origin: label,
                        reason: format!("unsupported entry: {}", crate::node::describe(&other)),
                    })
                }
            }
        }

        if !self_emitted {
            out.push(self_fragment);
        }
        stack.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::get_path;
    use tempfile::tempdir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempdir().expect("tempdir");
        write(
            dir.path(),
            "train.yaml",
            "defaults:\n  - _self_\n  - trainer: default\n  - logger: null\ntask_name: train\n",
        );
        write(
            dir.path(),
            "trainer/default.yaml",
            "defaults:\n  - _self_\n  - profiler: null\naccelerator: cpu\nmax_epochs: 100\nprofiler: null\n",
        );
        write(dir.path(), "trainer/gpu.yaml", "defaults:\n  - default\naccelerator: gpu\n");
        write(dir.path(), "trainer/profiler/simple.yaml", "_target_: profiler.simple\n");
        write(dir.path(), "logger/csv.yaml", "csv:\n  _target_: logger.csv\n");
        dir
    }

    #[test]
    fn expands_defaults_in_order() {
        let dir = fixture();
        let source = ConfigSource::new(dir.path());
        let fragments = source.load("train", &GroupChoices::new()).unwrap();
        let names: Vec<_> = fragments.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["train.yaml", "trainer/default.yaml"]);
        assert_eq!(fragments[1].package, "trainer");
    }

    #[test]
    fn group_choice_selects_nested_option() {
        let dir = fixture();
        let source = ConfigSource::new(dir.path());
        let mut choices = GroupChoices::new();
        choices.insert("trainer/profiler".to_string(), Some("simple".to_string()));
        let composed = source.compose("train", &choices).unwrap();
        assert_eq!(
            get_path(&composed.value, "trainer.profiler._target_"),
            Some(&Value::from("profiler.simple"))
        );
        assert_eq!(composed.origins.of("trainer.profiler"), "trainer/profiler/simple.yaml");
    }

    #[test]
    fn sibling_entry_inherits_and_self_wins() {
        let dir = fixture();
        let source = ConfigSource::new(dir.path());
        let mut choices = GroupChoices::new();
        choices.insert("trainer".to_string(), Some("gpu".to_string()));
        let composed = source.compose("train", &choices).unwrap();
        assert_eq!(get_path(&composed.value, "trainer.accelerator"), Some(&Value::from("gpu")));
        assert_eq!(get_path(&composed.value, "trainer.max_epochs"), Some(&Value::from(100)));
    }

    #[test]
    fn null_group_contributes_nothing() {
        let dir = fixture();
        let composed = ConfigSource::new(dir.path())
            .compose("train", &GroupChoices::new())
            .unwrap();
        assert!(get_path(&composed.value, "logger").is_none());
        assert_eq!(get_path(&composed.value, "trainer.profiler"), Some(&Value::Null));
    }

    #[test]
    fn unknown_group_choice_is_rejected() {
        let dir = fixture();
        let mut choices = GroupChoices::new();
        choices.insert("paths".to_string(), Some("default".to_string()));
        let err = ConfigSource::new(dir.path()).load("train", &choices).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn missing_option_reports_path() {
        let dir = fixture();
        let mut choices = GroupChoices::new();
        choices.insert("trainer".to_string(), Some("tpu".to_string()));
        let err = ConfigSource::new(dir.path()).load("train", &choices).unwrap_err();
        match err {
            ConfigError::MissingConfig { name, .. } => assert_eq!(name, "trainer/tpu.yaml"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn recursive_defaults_are_rejected() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.yaml", "defaults:\n  - b\n");
        write(dir.path(), "b.yaml", "defaults:\n  - a\n");
        let err = ConfigSource::new(dir.path()).load("a", &GroupChoices::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDefaults { .. }));
    }
}
