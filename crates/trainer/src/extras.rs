//! Run-level conveniences switched on from the `extras` section.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use config_resolver::schema::check_fields;
use config_resolver::{
    node, render_tree, Composed, ConfigError, FieldSpec, FieldType, Origins, Resolved, Strictness,
};
use log::LevelFilter;
use serde::Deserialize;
use serde_yaml::Value;

pub const EXTRAS_SECTION: &str = "extras";
pub const TAGS_KEY: &str = "tags";

pub const EXTRAS_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("ignore_warnings", FieldType::Bool),
    FieldSpec::new("enforce_tags", FieldType::Bool),
    FieldSpec::new("print_config", FieldType::Bool),
];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Extras {
    /// Only errors reach the log after extras are applied.
    pub ignore_warnings: bool,
    /// Ask for tags when none are configured.
    pub enforce_tags: bool,
    /// Print the resolved config tree and save it next to the run outputs.
    pub print_config: bool,
}

/// Reads the `extras` section; `None` when it is absent or null.
///
/// Keys are checked against [`EXTRAS_SCHEMA`] under `strictness`, like any
/// target section.
pub fn extras_of(
    cfg: &Value,
    origins: &Origins,
    strictness: Strictness,
) -> config_resolver::Result<Option<Extras>> {
    let map = match node::get_path(cfg, EXTRAS_SECTION) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Mapping(map)) => map,
        Some(other) => {
            return Err(ConfigError::TypeMismatch {
                field: EXTRAS_SECTION.to_string(),
                origin: origins.of(EXTRAS_SECTION).to_string(),
                expected: "mapping".to_string(),
                found: node::describe(other),
            })
        }
    };
    let fields = check_fields(EXTRAS_SECTION, map, EXTRAS_SCHEMA, origins, strictness)?;
    serde_yaml::from_value(Value::Mapping(fields))
        .map(Some)
        .map_err(|err| ConfigError::TypeMismatch {
            field: EXTRAS_SECTION.to_string(),
            origin: origins.of(EXTRAS_SECTION).to_string(),
            expected: "extras mapping".to_string(),
            found: err.to_string(),
        })
}

fn tags_of(cfg: &Value) -> Vec<String> {
    match node::get_path(cfg, TAGS_KEY) {
        Some(Value::Sequence(items)) => items.iter().filter_map(node::scalar_to_string).collect(),
        Some(Value::String(tag)) if !tag.is_empty() => vec![tag.clone()],
        _ => Vec::new(),
    }
}

/// Fills in `tags` from `prompt` when `extras.enforce_tags` is set and the
/// config carries none. `prompt` returns a comma separated line.
pub fn enforce_tags<P>(
    composed: &mut Composed,
    strictness: Strictness,
    prompt: P,
) -> Result<Vec<String>>
where
    P: FnOnce() -> std::io::Result<String>,
{
    let enforce =
        extras_of(&composed.value, &composed.origins, strictness)?.is_some_and(|e| e.enforce_tags);
    let existing = tags_of(&composed.value);
    if !enforce || !existing.is_empty() {
        return Ok(existing);
    }

    log::info!("No tags specified. Now prompting user to input tags.");
    let line = prompt().context("Failed to read tags")?;
    let tags: Vec<String> = line
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect();
    if tags.is_empty() {
        bail!("Specify tags before launching the run! <extras.enforce_tags=True>");
    }

    node::set_path(
        &mut composed.value,
        TAGS_KEY,
        Value::Sequence(tags.iter().cloned().map(Value::String).collect()),
    );
    composed.origins.record(TAGS_KEY, "prompt");
    log::info!("Tags updated: {:?}", tags);
    Ok(tags)
}

/// Writes the resolved config to `dir/config.yaml`.
pub fn save_config(cfg: &Resolved, dir: &Path) -> Result<PathBuf> {
    let path = dir.join("config.yaml");
    let yaml = serde_yaml::to_string(&cfg.value).context("Failed to serialize the resolved config")?;
    fs::write(&path, yaml).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

/// Applies the remaining extras to a resolved config. Files go to
/// `output_dir` when one is given.
pub fn apply_extras(
    cfg: &Resolved,
    output_dir: Option<&Path>,
    strictness: Strictness,
) -> Result<()> {
    let extras = match extras_of(&cfg.value, &cfg.origins, strictness)? {
        Some(extras) => extras,
        None => {
            log::info!("Extras section not found. Skipping...");
            return Ok(());
        }
    };

    if extras.enforce_tags {
        if let Some(dir) = output_dir {
            let path = dir.join("tags.txt");
            fs::write(&path, format!("{:?}\n", tags_of(&cfg.value)))
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
    }

    if extras.print_config {
        log::info!("Printing config tree! <extras.print_config=True>");
        let tree = render_tree(&cfg.value, config_resolver::tree::PRINT_ORDER);
        println!("{}", tree);
        if let Some(dir) = output_dir {
            let path = dir.join("config_tree.txt");
            fs::write(&path, &tree).with_context(|| format!("Failed to write {:?}", path))?;
        }
    }

    // last, so the messages above still get through
    if extras.ignore_warnings {
        log::info!("Disabling warnings! <extras.ignore_warnings=True>");
        log::set_max_level(LevelFilter::Error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_resolver::{resolve, Resolvers};
    use tempfile::tempdir;

    fn composed(src: &str) -> Composed {
        Composed::new(serde_yaml::from_str(src).unwrap(), "train.yaml")
    }

    #[test]
    fn prompt_is_skipped_when_tags_exist() {
        let mut c = composed("extras:\n  enforce_tags: true\ntags: [dev]\n");
        let tags = enforce_tags(&mut c, Strictness::Strict, || panic!("should not prompt")).unwrap();
        assert_eq!(tags, vec!["dev"]);
    }

    #[test]
    fn prompted_tags_are_written_into_the_config() {
        let mut c = composed("extras:\n  enforce_tags: true\ntags: []\n");
        let tags = enforce_tags(&mut c, Strictness::Strict, || Ok(" lr-sweep, ,baseline ".to_string())).unwrap();
        assert_eq!(tags, vec!["lr-sweep", "baseline"]);
        assert_eq!(tags_of(&c.value), tags);
        assert_eq!(c.origins.of("tags"), "prompt");
    }

    #[test]
    fn empty_prompt_answer_fails() {
        let mut c = composed("extras:\n  enforce_tags: true\n");
        assert!(enforce_tags(&mut c, Strictness::Strict, || Ok("  ".to_string())).is_err());
    }

    #[test]
    fn print_config_saves_the_tree() {
        let dir = tempdir().unwrap();
        let c = composed("extras:\n  print_config: true\ntrainer:\n  max_epochs: 3\n");
        let cfg = resolve(c, &Resolvers::new()).unwrap();
        apply_extras(&cfg, Some(dir.path()), Strictness::Strict).unwrap();
        let tree = fs::read_to_string(dir.path().join("config_tree.txt")).unwrap();
        assert!(tree.starts_with("CONFIG\n├── trainer\n"));
    }

    #[test]
    fn misspelled_extra_depends_on_strictness() {
        let c = composed("extras:\n  print_confg: true\n");
        let cfg = resolve(c, &Resolvers::new()).unwrap();

        let err = apply_extras(&cfg, None, Strictness::Strict).unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::UnknownOption { field, origin }) => {
                assert_eq!(field, "extras.print_confg");
                assert_eq!(origin, "train.yaml");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let extras = extras_of(&cfg.value, &cfg.origins, Strictness::Lenient).unwrap();
        assert_eq!(extras, Some(Extras::default()));
        apply_extras(&cfg, None, Strictness::Lenient).unwrap();
    }

    #[test]
    fn wrongly_typed_extra_names_its_origin() {
        let mut c = composed("extras:\n  print_config: true\n");
        node::set_path(&mut c.value, "extras.print_config", Value::from("yes please"));
        c.origins.record("extras.print_config", "command line");

        let err = extras_of(&c.value, &c.origins, Strictness::Strict).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { ref field, ref origin, .. }
            if field == "extras.print_config" && origin == "command line"));
    }

    #[test]
    fn save_config_names_the_file_it_failed_to_write() {
        let dir = tempdir().unwrap();
        let cfg = resolve(composed("seed: 7\n"), &Resolvers::new()).unwrap();
        let path = save_config(&cfg, dir.path()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "seed: 7\n");

        let missing = dir.path().join("not-created");
        let err = save_config(&cfg, &missing).unwrap_err();
        assert!(format!("{:#}", err).contains("not-created"), "{err:#}");
    }
}
