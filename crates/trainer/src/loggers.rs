//! Experiment loggers handed to the trainer.

use std::path::{Path, PathBuf};

use config_resolver::{Args, ConfigError, FieldSpec, FieldType, Result};
use serde::{Deserialize, Serialize};

use crate::factory::Factory;

const VERSION: FieldType =
    FieldType::Nullable(&FieldType::OneOf(&[FieldType::Int, FieldType::Str]));

pub const CSV_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("save_dir", FieldType::Str),
    FieldSpec::new("name", FieldType::Nullable(&FieldType::Str)),
    FieldSpec::new("version", VERSION),
    FieldSpec::new("prefix", FieldType::Str),
];

pub const TENSORBOARD_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("save_dir", FieldType::Str),
    FieldSpec::new("name", FieldType::Nullable(&FieldType::Str)),
    FieldSpec::new("version", VERSION),
    FieldSpec::new("prefix", FieldType::Str),
    FieldSpec::new("log_graph", FieldType::Bool),
    FieldSpec::new("default_hp_metric", FieldType::Bool),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Version {
    Number(u64),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvLogger {
    pub save_dir: PathBuf,
    pub name: Option<String>,
    pub version: Option<Version>,
    pub prefix: String,
}

impl Default for CsvLogger {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::new(),
            name: Some("lightning_logs".to_string()),
            version: None,
            prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorBoardLogger {
    pub save_dir: PathBuf,
    pub name: Option<String>,
    pub version: Option<Version>,
    pub prefix: String,
    pub log_graph: bool,
    pub default_hp_metric: bool,
}

impl Default for TensorBoardLogger {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::new(),
            name: Some("lightning_logs".to_string()),
            version: None,
            prefix: String::new(),
            log_graph: false,
            default_hp_metric: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Logger {
    Csv(CsvLogger),
    TensorBoard(TensorBoardLogger),
}

impl Logger {
    pub fn name(&self) -> &'static str {
        match self {
            Logger::Csv(_) => "csv",
            Logger::TensorBoard(_) => "tensorboard",
        }
    }

    /// Directory the logger writes to: `save_dir/name/version`.
    ///
    /// Without an explicit version the next free `version_N` is picked at
    /// run time, so only the parent directory is known here.
    pub fn log_dir(&self) -> PathBuf {
        let (save_dir, name, version) = match self {
            Logger::Csv(l) => (&l.save_dir, &l.name, &l.version),
            Logger::TensorBoard(l) => (&l.save_dir, &l.name, &l.version),
        };
        let mut dir = save_dir.clone();
        if let Some(name) = name.as_deref().filter(|n| !n.is_empty()) {
            dir.push(name);
        }
        match version {
            Some(Version::Number(n)) => dir.push(format!("version_{}", n)),
            Some(Version::Label(label)) => dir.push(label),
            None => {}
        }
        dir
    }
}

fn require_save_dir(path: &str, save_dir: &Path) -> Result<()> {
    if save_dir.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: format!("{}.save_dir", path),
            reason: "a save directory is required".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn build_csv(args: Args<'_>, _: &Factory) -> Result<Logger> {
    let path = args.path().to_string();
    let logger: CsvLogger = args.into_typed()?;
    require_save_dir(&path, &logger.save_dir)?;
    Ok(Logger::Csv(logger))
}

pub(crate) fn build_tensorboard(args: Args<'_>, _: &Factory) -> Result<Logger> {
    let path = args.path().to_string();
    let logger: TensorBoardLogger = args.into_typed()?;
    require_save_dir(&path, &logger.save_dir)?;
    Ok(Logger::TensorBoard(logger))
}
