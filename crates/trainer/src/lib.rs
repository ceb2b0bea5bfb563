pub mod callbacks;
pub mod extras;
pub mod factory;
pub mod loggers;
pub mod options;
pub mod profiler;
pub mod resolvers;
pub mod train;

pub use factory::Factory;
pub use options::{Accelerator, BatchLimit, CheckInterval, ClipAlgorithm, Devices, FastDevRun, Precision, Stage};
pub use train::Trainer;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Construction options of a [`Trainer`], one field per config key.
///
/// `None` leaves the choice to the trainer's own default; see the accessors
/// on [`Trainer`] for what each one becomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerOptions {
    pub accelerator: Accelerator,
    pub strategy: String,
    pub devices: Devices,
    pub num_nodes: u32,
    pub precision: Precision,
    pub min_epochs: Option<i64>,
    /// `-1` trains without an epoch bound.
    pub max_epochs: Option<i64>,
    pub min_steps: Option<i64>,
    /// `-1` trains without a step bound.
    pub max_steps: i64,
    pub val_check_interval: Option<CheckInterval>,
    pub check_val_every_n_epoch: Option<u64>,
    pub limit_train_batches: Option<BatchLimit>,
    pub limit_val_batches: Option<BatchLimit>,
    pub limit_test_batches: Option<BatchLimit>,
    pub limit_predict_batches: Option<BatchLimit>,
    pub overfit_batches: BatchLimit,
    pub num_sanity_val_steps: Option<i64>,
    pub log_every_n_steps: Option<u64>,
    pub accumulate_grad_batches: u64,
    pub gradient_clip_val: Option<f64>,
    pub gradient_clip_algorithm: ClipAlgorithm,
    pub deterministic: bool,
    /// cuDNN autotuner.
    pub benchmark: bool,
    pub sync_batchnorm: bool,
    pub detect_anomaly: bool,
    pub inference_mode: bool,
    pub enable_checkpointing: bool,
    pub enable_progress_bar: bool,
    pub enable_model_summary: bool,
    pub fast_dev_run: FastDevRun,
    pub default_root_dir: Option<PathBuf>,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            accelerator: Accelerator::Cpu,
            strategy: "auto".to_string(),
            devices: Devices::Count(1),
            num_nodes: 1,
            precision: Precision::Full,
            min_epochs: Some(1),
            max_epochs: Some(100),
            min_steps: None,
            max_steps: -1,
            val_check_interval: Some(CheckInterval::Fraction(1.0)),
            check_val_every_n_epoch: Some(1),
            limit_train_batches: None,
            limit_val_batches: None,
            limit_test_batches: None,
            limit_predict_batches: None,
            overfit_batches: BatchLimit::Fraction(0.0),
            num_sanity_val_steps: None,
            log_every_n_steps: Some(50),
            accumulate_grad_batches: 1,
            gradient_clip_val: None,
            gradient_clip_algorithm: ClipAlgorithm::Norm,
            deterministic: false,
            benchmark: true,
            sync_batchnorm: false,
            detect_anomaly: false,
            inference_mode: true,
            enable_checkpointing: true,
            enable_progress_bar: true,
            enable_model_summary: true,
            fast_dev_run: FastDevRun::Enabled(false),
            default_root_dir: None,
        }
    }
}
