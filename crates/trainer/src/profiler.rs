//! Profilers a trainer can attach to a run.

use std::path::PathBuf;

use config_resolver::{Args, FieldSpec, FieldType, Result};
use serde::{Deserialize, Serialize};

use crate::factory::Factory;

const PATH: FieldType = FieldType::Nullable(&FieldType::Str);

pub const SIMPLE_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("dirpath", PATH),
    FieldSpec::new("filename", PATH),
    FieldSpec::new("extended", FieldType::Bool),
];

pub const ADVANCED_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("dirpath", PATH),
    FieldSpec::new("filename", PATH),
    FieldSpec::new("line_count_restriction", FieldType::Float),
];

/// Wall-clock timing per action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleProfiler {
    pub dirpath: Option<PathBuf>,
    pub filename: Option<String>,
    /// Also report mean duration and call counts.
    pub extended: bool,
}

impl Default for SimpleProfiler {
    fn default() -> Self {
        Self {
            dirpath: None,
            filename: None,
            extended: true,
        }
    }
}

/// Per-function statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedProfiler {
    pub dirpath: Option<PathBuf>,
    pub filename: Option<String>,
    /// Fraction (<= 1.0) or count of report lines kept per action.
    pub line_count_restriction: f64,
}

impl Default for AdvancedProfiler {
    fn default() -> Self {
        Self {
            dirpath: None,
            filename: None,
            line_count_restriction: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Profiler {
    Simple(SimpleProfiler),
    Advanced(AdvancedProfiler),
}

impl Profiler {
    pub fn name(&self) -> &'static str {
        match self {
            Profiler::Simple(_) => "simple",
            Profiler::Advanced(_) => "advanced",
        }
    }

    /// File the report for `stage` is written to, if the profiler writes one.
    /// Without a file name the report goes to the log instead.
    pub fn report_path(&self, stage: &str) -> Option<PathBuf> {
        let (dirpath, filename) = match self {
            Profiler::Simple(p) => (&p.dirpath, &p.filename),
            Profiler::Advanced(p) => (&p.dirpath, &p.filename),
        };
        let filename = filename.as_ref()?;
        let dir = dirpath.clone().unwrap_or_else(|| PathBuf::from("."));
        Some(dir.join(format!("{}-{}.txt", stage, filename)))
    }
}

pub(crate) fn build_simple(args: Args<'_>, _: &Factory) -> Result<Profiler> {
    args.into_typed().map(Profiler::Simple)
}

pub(crate) fn build_advanced(args: Args<'_>, _: &Factory) -> Result<Profiler> {
    let path = args.path().to_string();
    let profiler: AdvancedProfiler = args.into_typed()?;
    if profiler.line_count_restriction <= 0.0 {
        return Err(config_resolver::ConfigError::InvalidValue {
            field: format!("{}.line_count_restriction", path),
            reason: "must be positive".to_string(),
        });
    }
    Ok(Profiler::Advanced(profiler))
}
