//! The application's table of instantiable targets.

use config_resolver::{Args, FieldSpec, FieldType, Registry, Resolved, Result, Strictness};

use crate::callbacks::{self, Callback};
use crate::loggers::{self, Logger};
use crate::options::{ACCELERATORS, CLIP_ALGORITHMS, PRECISIONS};
use crate::profiler::{self, Profiler};
use crate::{Trainer, TrainerOptions};

pub const TRAINER: &str = "trainer::Trainer";
pub const SIMPLE_PROFILER: &str = "trainer::profiler::SimpleProfiler";
pub const ADVANCED_PROFILER: &str = "trainer::profiler::AdvancedProfiler";
pub const MODEL_CHECKPOINT: &str = "trainer::callbacks::ModelCheckpoint";
pub const EARLY_STOPPING: &str = "trainer::callbacks::EarlyStopping";
pub const LR_MONITOR: &str = "trainer::callbacks::LearningRateMonitor";
pub const CSV_LOGGER: &str = "trainer::loggers::CSVLogger";
pub const TENSORBOARD_LOGGER: &str = "trainer::loggers::TensorBoardLogger";

/// Config sections the run reads.
pub const TRAINER_SECTION: &str = "trainer";
pub const CALLBACKS_SECTION: &str = "callbacks";
pub const LOGGER_SECTION: &str = "logger";

const OPT_INT: FieldType = FieldType::Nullable(&FieldType::Int);
const OPT_FLOAT: FieldType = FieldType::Nullable(&FieldType::Float);
const OPT_UINT: FieldType = FieldType::Nullable(&FieldType::UInt);

pub const TRAINER_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("accelerator", FieldType::Enum(ACCELERATORS)),
    FieldSpec::new("strategy", FieldType::Str),
    FieldSpec::new(
        "devices",
        FieldType::Auto(&FieldType::OneOf(&[
            FieldType::Int,
            FieldType::List(&FieldType::Int),
            FieldType::Str,
        ])),
    ),
    FieldSpec::new("num_nodes", FieldType::UInt),
    FieldSpec::new(
        "precision",
        FieldType::OneOf(&[FieldType::Enum(PRECISIONS), FieldType::Int]),
    ),
    FieldSpec::new("min_epochs", OPT_INT),
    FieldSpec::new("max_epochs", OPT_INT),
    FieldSpec::new("min_steps", OPT_INT),
    FieldSpec::new("max_steps", FieldType::Int),
    FieldSpec::new("val_check_interval", OPT_FLOAT),
    FieldSpec::new("check_val_every_n_epoch", OPT_UINT),
    FieldSpec::new("limit_train_batches", OPT_FLOAT),
    FieldSpec::new("limit_val_batches", OPT_FLOAT),
    FieldSpec::new("limit_test_batches", OPT_FLOAT),
    FieldSpec::new("limit_predict_batches", OPT_FLOAT),
    FieldSpec::new("overfit_batches", FieldType::Float),
    FieldSpec::new("num_sanity_val_steps", OPT_INT),
    FieldSpec::new("log_every_n_steps", OPT_UINT),
    FieldSpec::new("accumulate_grad_batches", FieldType::UInt),
    FieldSpec::new("gradient_clip_val", OPT_FLOAT),
    FieldSpec::new("gradient_clip_algorithm", FieldType::Enum(CLIP_ALGORITHMS)),
    FieldSpec::new("deterministic", FieldType::Bool),
    FieldSpec::new("benchmark", FieldType::Bool),
    FieldSpec::new("sync_batchnorm", FieldType::Bool),
    FieldSpec::new("detect_anomaly", FieldType::Bool),
    FieldSpec::new("inference_mode", FieldType::Bool),
    FieldSpec::new("enable_checkpointing", FieldType::Bool),
    FieldSpec::new("enable_progress_bar", FieldType::Bool),
    FieldSpec::new("enable_model_summary", FieldType::Bool),
    FieldSpec::new(
        "fast_dev_run",
        FieldType::OneOf(&[FieldType::Bool, FieldType::Int]),
    ),
    FieldSpec::new("profiler", FieldType::Nullable(&FieldType::Target)),
    FieldSpec::new("default_root_dir", FieldType::Nullable(&FieldType::Str)),
];

/// Every registry the run instantiates from, sharing one strictness policy.
pub struct Factory {
    pub trainers: Registry<Trainer, Factory>,
    pub profilers: Registry<Profiler, Factory>,
    pub callbacks: Registry<Callback, Factory>,
    pub loggers: Registry<Logger, Factory>,
}

fn build_trainer(mut args: Args<'_>, factory: &Factory) -> Result<Trainer> {
    let profiler = args.nested("profiler", &factory.profilers, factory)?;
    let options: TrainerOptions = args.into_typed()?;
    Trainer::new(options, profiler)
}

impl Factory {
    pub fn new(strictness: Strictness) -> Self {
        let mut trainers: Registry<Trainer, Factory> = Registry::new("trainer", strictness);
        trainers.register(TRAINER, TRAINER_SCHEMA, build_trainer);

        let mut profilers: Registry<Profiler, Factory> = Registry::new("profiler", strictness);
        profilers
            .register(SIMPLE_PROFILER, profiler::SIMPLE_SCHEMA, profiler::build_simple)
            .register(ADVANCED_PROFILER, profiler::ADVANCED_SCHEMA, profiler::build_advanced);

        let mut callbacks: Registry<Callback, Factory> = Registry::new("callback", strictness);
        callbacks
            .register(
                MODEL_CHECKPOINT,
                callbacks::MODEL_CHECKPOINT_SCHEMA,
                callbacks::build_model_checkpoint,
            )
            .register(
                EARLY_STOPPING,
                callbacks::EARLY_STOPPING_SCHEMA,
                callbacks::build_early_stopping,
            )
            .register(LR_MONITOR, callbacks::LR_MONITOR_SCHEMA, callbacks::build_lr_monitor);

        let mut loggers: Registry<Logger, Factory> = Registry::new("logger", strictness);
        loggers
            .register(CSV_LOGGER, loggers::CSV_SCHEMA, loggers::build_csv)
            .register(
                TENSORBOARD_LOGGER,
                loggers::TENSORBOARD_SCHEMA,
                loggers::build_tensorboard,
            );

        Self {
            trainers,
            profilers,
            callbacks,
            loggers,
        }
    }

    pub fn build_callbacks(&self, cfg: &Resolved) -> Result<Vec<Callback>> {
        self.callbacks.instantiate_all(cfg, CALLBACKS_SECTION, self)
    }

    pub fn build_loggers(&self, cfg: &Resolved) -> Result<Vec<Logger>> {
        self.loggers.instantiate_all(cfg, LOGGER_SECTION, self)
    }

    /// Builds the trainer with its callbacks and loggers attached.
    pub fn build_trainer(&self, cfg: &Resolved) -> Result<Trainer> {
        let callbacks = self.build_callbacks(cfg)?;
        let loggers = self.build_loggers(cfg)?;
        let trainer = self.trainers.instantiate(cfg, TRAINER_SECTION, self)?;
        Ok(trainer.with_callbacks(callbacks).with_loggers(loggers))
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new(Strictness::default())
    }
}
