//! Callbacks handed to the trainer alongside its options.

use std::path::PathBuf;

use config_resolver::{Args, ConfigError, FieldSpec, FieldType, Result};
use serde::{Deserialize, Serialize};

use crate::factory::Factory;

const OPT_STR: FieldType = FieldType::Nullable(&FieldType::Str);
const MODE: FieldType = FieldType::Enum(&["min", "max"]);

pub const MODEL_CHECKPOINT_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("dirpath", OPT_STR),
    FieldSpec::new("filename", OPT_STR),
    FieldSpec::new("monitor", OPT_STR),
    FieldSpec::new("mode", MODE),
    FieldSpec::new("save_top_k", FieldType::Int),
    FieldSpec::new("save_last", FieldType::Nullable(&FieldType::Bool)),
    FieldSpec::new("every_n_epochs", FieldType::Nullable(&FieldType::UInt)),
    FieldSpec::new("auto_insert_metric_name", FieldType::Bool),
    FieldSpec::new("verbose", FieldType::Bool),
];

pub const EARLY_STOPPING_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("monitor", FieldType::Str),
    FieldSpec::new("mode", MODE),
    FieldSpec::new("patience", FieldType::UInt),
    FieldSpec::new("min_delta", FieldType::Float),
    FieldSpec::new("check_finite", FieldType::Bool),
    FieldSpec::new("verbose", FieldType::Bool),
];

pub const LR_MONITOR_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "logging_interval",
        FieldType::Nullable(&FieldType::Enum(&["step", "epoch"])),
    ),
    FieldSpec::new("log_momentum", FieldType::Bool),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingInterval {
    Step,
    Epoch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCheckpoint {
    pub dirpath: Option<PathBuf>,
    pub filename: Option<String>,
    pub monitor: Option<String>,
    pub mode: MonitorMode,
    /// `-1` keeps every checkpoint, `0` none.
    pub save_top_k: i64,
    pub save_last: Option<bool>,
    pub every_n_epochs: Option<u64>,
    pub auto_insert_metric_name: bool,
    pub verbose: bool,
}

impl Default for ModelCheckpoint {
    fn default() -> Self {
        Self {
            dirpath: None,
            filename: None,
            monitor: None,
            mode: MonitorMode::Min,
            save_top_k: 1,
            save_last: None,
            every_n_epochs: None,
            auto_insert_metric_name: true,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStopping {
    pub monitor: String,
    pub mode: MonitorMode,
    pub patience: u64,
    pub min_delta: f64,
    pub check_finite: bool,
    pub verbose: bool,
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self {
            monitor: String::new(),
            mode: MonitorMode::Min,
            patience: 3,
            min_delta: 0.0,
            check_finite: true,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningRateMonitor {
    /// `None` follows the scheduler's own interval.
    pub logging_interval: Option<LoggingInterval>,
    pub log_momentum: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    ModelCheckpoint(ModelCheckpoint),
    EarlyStopping(EarlyStopping),
    LearningRateMonitor(LearningRateMonitor),
}

impl Callback {
    pub fn name(&self) -> &'static str {
        match self {
            Callback::ModelCheckpoint(_) => "model_checkpoint",
            Callback::EarlyStopping(_) => "early_stopping",
            Callback::LearningRateMonitor(_) => "learning_rate_monitor",
        }
    }
}

fn invalid(args: &Args<'_>, field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: format!("{}.{}", args.path(), field),
        reason: reason.to_string(),
    }
}

pub(crate) fn build_model_checkpoint(args: Args<'_>, _: &Factory) -> Result<Callback> {
    let err = invalid(&args, "save_top_k", "must be -1 or greater");
    let checkpoint: ModelCheckpoint = args.into_typed()?;
    if checkpoint.save_top_k < -1 {
        return Err(err);
    }
    Ok(Callback::ModelCheckpoint(checkpoint))
}

pub(crate) fn build_early_stopping(args: Args<'_>, _: &Factory) -> Result<Callback> {
    let err = invalid(&args, "monitor", "a metric to monitor is required");
    let stopping: EarlyStopping = args.into_typed()?;
    if stopping.monitor.is_empty() {
        return Err(err);
    }
    Ok(Callback::EarlyStopping(stopping))
}

pub(crate) fn build_lr_monitor(args: Args<'_>, _: &Factory) -> Result<Callback> {
    args.into_typed().map(Callback::LearningRateMonitor)
}
