use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use config_resolver::{ConfigError, Result};

use crate::callbacks::Callback;
use crate::factory::TRAINER_SECTION;
use crate::loggers::Logger;
use crate::options::{BatchLimit, CheckInterval, ClipAlgorithm, Stage};
use crate::profiler::Profiler;
use crate::TrainerOptions;

/// Epoch bound used when neither epochs nor steps limit the run.
pub const DEFAULT_MAX_EPOCHS: u64 = 1000;
pub const DEFAULT_SANITY_VAL_STEPS: i64 = 2;
pub const DEFAULT_LOG_EVERY_N_STEPS: u64 = 50;

/// The training-loop controller, holding everything it was constructed with.
///
/// Running the loop is the training runtime's job; this type owns the
/// checked options and turns `None`/`"auto"` into the values the runtime
/// would pick.
#[derive(Debug, Clone, PartialEq)]
pub struct Trainer {
    options: TrainerOptions,
    profiler: Option<Profiler>,
    callbacks: Vec<Callback>,
    loggers: Vec<Logger>,
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: format!("{}.{}", TRAINER_SECTION, field),
        reason: reason.into(),
    }
}

fn check_options(options: &TrainerOptions) -> Result<()> {
    if let Some(n) = options.max_epochs {
        if n < -1 {
            return Err(invalid("max_epochs", "must be -1 (unbounded) or non-negative"));
        }
    }
    if let Some(n) = options.min_epochs {
        if n < 0 {
            return Err(invalid("min_epochs", "must be non-negative"));
        }
        if let Some(max) = options.max_epochs.filter(|max| *max >= 0) {
            if n > max {
                return Err(invalid(
                    "min_epochs",
                    format!("{} exceeds max_epochs {}", n, max),
                ));
            }
        }
    }
    if options.max_steps < -1 {
        return Err(invalid("max_steps", "must be -1 (unbounded) or non-negative"));
    }
    if options.min_steps.is_some_and(|n| n < 0) {
        return Err(invalid("min_steps", "must be non-negative"));
    }
    if options.num_nodes == 0 {
        return Err(invalid("num_nodes", "must be at least 1"));
    }
    if options.accumulate_grad_batches == 0 {
        return Err(invalid("accumulate_grad_batches", "must be at least 1"));
    }
    if options.num_sanity_val_steps.is_some_and(|n| n < -1) {
        return Err(invalid("num_sanity_val_steps", "must be -1 (all) or non-negative"));
    }
    if options.gradient_clip_val.is_some_and(|v| v < 0.0) {
        return Err(invalid("gradient_clip_val", "must be non-negative"));
    }
    options
        .devices
        .check()
        .map_err(|reason| invalid("devices", reason))?;
    if let Some(interval) = &options.val_check_interval {
        interval
            .check()
            .map_err(|reason| invalid("val_check_interval", reason))?;
    }

    let limits = [
        ("limit_train_batches", options.limit_train_batches),
        ("limit_val_batches", options.limit_val_batches),
        ("limit_test_batches", options.limit_test_batches),
        ("limit_predict_batches", options.limit_predict_batches),
        ("overfit_batches", Some(options.overfit_batches)),
    ];
    for (field, limit) in limits {
        if let Some(limit) = limit {
            limit.check().map_err(|reason| invalid(field, reason))?;
        }
    }
    Ok(())
}

impl Trainer {
    pub fn new(options: TrainerOptions, profiler: Option<Profiler>) -> Result<Self> {
        check_options(&options)?;
        Ok(Self {
            options,
            profiler,
            callbacks: Vec::new(),
            loggers: Vec::new(),
        })
    }

    pub fn with_callbacks(mut self, callbacks: Vec<Callback>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_loggers(mut self, loggers: Vec<Logger>) -> Self {
        self.loggers = loggers;
        self
    }

    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }

    pub fn profiler(&self) -> Option<&Profiler> {
        self.profiler.as_ref()
    }

    pub fn callbacks(&self) -> &[Callback] {
        &self.callbacks
    }

    pub fn loggers(&self) -> &[Logger] {
        &self.loggers
    }

    /// Upper epoch bound; `None` when the run is unbounded in epochs.
    pub fn max_epochs(&self) -> Option<u64> {
        match self.options.max_epochs {
            Some(-1) => None,
            Some(n) => Some(n as u64),
            None if self.options.max_steps == -1 => Some(DEFAULT_MAX_EPOCHS),
            None => None,
        }
    }

    pub fn min_epochs(&self) -> u64 {
        match (self.options.min_epochs, self.options.min_steps) {
            (Some(n), _) => n as u64,
            (None, None) => 1,
            (None, Some(_)) => 0,
        }
    }

    /// Upper step bound; `None` when the run is unbounded in steps.
    pub fn max_steps(&self) -> Option<u64> {
        match self.options.max_steps {
            -1 => None,
            n => Some(n as u64),
        }
    }

    pub fn num_sanity_val_steps(&self) -> i64 {
        self.options
            .num_sanity_val_steps
            .unwrap_or(DEFAULT_SANITY_VAL_STEPS)
    }

    pub fn val_check_interval(&self) -> CheckInterval {
        self.options
            .val_check_interval
            .unwrap_or(CheckInterval::Fraction(1.0))
    }

    pub fn log_every_n_steps(&self) -> u64 {
        self.options
            .log_every_n_steps
            .unwrap_or(DEFAULT_LOG_EVERY_N_STEPS)
    }

    /// Batch limit for a stage; unset limits use the whole dataloader.
    pub fn limit_batches(&self, stage: Stage) -> BatchLimit {
        let limit = match stage {
            Stage::Train => self.options.limit_train_batches,
            Stage::Validate => self.options.limit_val_batches,
            Stage::Test => self.options.limit_test_batches,
            Stage::Predict => self.options.limit_predict_batches,
        };
        limit.unwrap_or(BatchLimit::ALL)
    }

    /// Clip value and algorithm, or `None` when gradients are not clipped.
    pub fn gradient_clipping(&self) -> Option<(f64, ClipAlgorithm)> {
        self.options
            .gradient_clip_val
            .filter(|v| *v > 0.0)
            .map(|v| (v, self.options.gradient_clip_algorithm))
    }

    /// Where checkpoints and logs go when nothing more specific is set.
    pub fn default_root_dir(&self) -> PathBuf {
        self.options
            .default_root_dir
            .clone()
            .unwrap_or_else(|| Path::new(".").to_path_buf())
    }

    /// One line per setting, for the run log.
    pub fn summary(&self) -> String {
        let o = &self.options;
        let mut out = String::new();
        let _ = writeln!(out, "accelerator: {:?}", o.accelerator);
        let _ = writeln!(out, "devices: {:?} x {} node(s)", o.devices, o.num_nodes);
        let _ = writeln!(out, "strategy: {}", o.strategy);
        let mode = if o.precision.is_mixed() { "mixed" } else { "true" };
        let _ = writeln!(out, "precision: {} ({})", o.precision, mode);
        let _ = writeln!(
            out,
            "epochs: {}..{}",
            self.min_epochs(),
            self.max_epochs()
                .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
        );
        let _ = writeln!(out, "val_check_interval: {:?}", self.val_check_interval());
        match self.gradient_clipping() {
            Some((value, algorithm)) => {
                let _ = writeln!(out, "gradient clipping: {:?} at {}", algorithm, value);
            }
            None => {
                let _ = writeln!(out, "gradient clipping: off");
            }
        }
        if let Some(profiler) = &self.profiler {
            let _ = writeln!(out, "profiler: {}", profiler.name());
        }
        let callbacks: Vec<_> = self.callbacks.iter().map(Callback::name).collect();
        let _ = writeln!(out, "callbacks: [{}]", callbacks.join(", "));
        let loggers: Vec<_> = self.loggers.iter().map(Logger::name).collect();
        let _ = writeln!(out, "loggers: [{}]", loggers.join(", "));
        let _ = write!(out, "default_root_dir: {}", self.default_root_dir().display());
        out
    }
}
