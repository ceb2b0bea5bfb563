//! Value domains of the trainer options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hardware family the run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    #[default]
    Cpu,
    Gpu,
    Cuda,
    Tpu,
    Ipu,
    Hpu,
    Mps,
    Auto,
}

pub const ACCELERATORS: &[&str] = &["cpu", "gpu", "cuda", "tpu", "ipu", "hpu", "mps", "auto"];

/// Which devices to use: a count, explicit indices, or a string such as
/// `"auto"`, `"-1"` or `"0,1"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Devices {
    Count(i64),
    Indices(Vec<u32>),
    Spec(String),
}

impl Devices {
    pub fn is_auto(&self) -> bool {
        matches!(self, Devices::Spec(s) if s == "auto")
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        match self {
            Devices::Count(n) if *n == 0 || *n < -1 => {
                Err(format!("device count must be positive or -1, got {}", n))
            }
            Devices::Indices(ids) if ids.is_empty() => Err("device list is empty".to_string()),
            Devices::Spec(s) if s != "auto" => {
                let valid = s
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .all(|part| part.parse::<i64>().is_ok());
                if valid && !s.trim().is_empty() {
                    Ok(())
                } else {
                    Err(format!("cannot parse device string {:?}", s))
                }
            }
            _ => Ok(()),
        }
    }
}

impl Default for Devices {
    fn default() -> Self {
        Devices::Count(1)
    }
}

/// Numeric precision mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "PrecisionRepr", into = "String")]
pub enum Precision {
    Double,
    #[default]
    Full,
    Half,
    HalfMixed,
    BFloat,
    BFloatMixed,
    TransformerEngine,
    TransformerEngineFloat16,
}

/// Accepted spellings, legacy aliases included.
pub const PRECISIONS: &[&str] = &[
    "64-true",
    "64",
    "32-true",
    "32",
    "16-true",
    "16-mixed",
    "16",
    "bf16-true",
    "bf16-mixed",
    "bf16",
    "transformer-engine",
    "transformer-engine-float16",
];

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Double => "64-true",
            Precision::Full => "32-true",
            Precision::Half => "16-true",
            Precision::HalfMixed => "16-mixed",
            Precision::BFloat => "bf16-true",
            Precision::BFloatMixed => "bf16-mixed",
            Precision::TransformerEngine => "transformer-engine",
            Precision::TransformerEngineFloat16 => "transformer-engine-float16",
        }
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, Precision::HalfMixed | Precision::BFloatMixed)
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "64-true" | "64" => Ok(Precision::Double),
            "32-true" | "32" => Ok(Precision::Full),
            "16-true" => Ok(Precision::Half),
            // bare 16 and bf16 have always meant mixed precision
            "16-mixed" | "16" => Ok(Precision::HalfMixed),
            "bf16-true" => Ok(Precision::BFloat),
            "bf16-mixed" | "bf16" => Ok(Precision::BFloatMixed),
            "transformer-engine" => Ok(Precision::TransformerEngine),
            "transformer-engine-float16" => Ok(Precision::TransformerEngineFloat16),
            other => Err(format!(
                "unknown precision {:?}, expected one of {}",
                other,
                PRECISIONS.join(", ")
            )),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Precision> for String {
    fn from(p: Precision) -> Self {
        p.as_str().to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PrecisionRepr {
    Int(i64),
    Str(String),
}

impl TryFrom<PrecisionRepr> for Precision {
    type Error = String;

    fn try_from(repr: PrecisionRepr) -> Result<Self, Self::Error> {
        match repr {
            PrecisionRepr::Int(bits) => bits.to_string().parse(),
            PrecisionRepr::Str(s) => s.parse(),
        }
    }
}

/// How much of a dataloader to use: a batch count or a fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchLimit {
    Count(u64),
    Fraction(f64),
}

impl BatchLimit {
    pub const ALL: BatchLimit = BatchLimit::Fraction(1.0);

    pub(crate) fn check(&self) -> Result<(), String> {
        match self {
            BatchLimit::Fraction(f) if !(0.0..=1.0).contains(f) => {
                Err(format!("fraction must be within [0.0, 1.0], got {}", f))
            }
            _ => Ok(()),
        }
    }
}

impl Default for BatchLimit {
    fn default() -> Self {
        BatchLimit::Fraction(0.0)
    }
}

/// Validation cadence: every N training steps, or a fraction of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckInterval {
    Steps(u64),
    Fraction(f64),
}

impl CheckInterval {
    pub(crate) fn check(&self) -> Result<(), String> {
        match self {
            CheckInterval::Steps(0) => Err("step interval must be positive".to_string()),
            CheckInterval::Fraction(f) if !(*f > 0.0 && *f <= 1.0) => {
                Err(format!("fraction must be within (0.0, 1.0], got {}", f))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipAlgorithm {
    #[default]
    Norm,
    Value,
}

pub const CLIP_ALGORITHMS: &[&str] = &["norm", "value"];

/// `true` runs one batch of every stage; a number runs that many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FastDevRun {
    Enabled(bool),
    Batches(u64),
}

impl Default for FastDevRun {
    fn default() -> Self {
        FastDevRun::Enabled(false)
    }
}

/// Dataloader stages a batch limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Train,
    Validate,
    Test,
    Predict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_accepts_legacy_spellings() {
        let p: Precision = serde_yaml::from_str("16").unwrap();
        assert_eq!(p, Precision::HalfMixed);
        let p: Precision = serde_yaml::from_str("bf16").unwrap();
        assert_eq!(p, Precision::BFloatMixed);
        let p: Precision = serde_yaml::from_str("\"32-true\"").unwrap();
        assert_eq!(p, Precision::Full);
        assert!(serde_yaml::from_str::<Precision>("8").is_err());
        assert_eq!(serde_yaml::to_string(&Precision::Full).unwrap().trim(), "32-true");
    }

    #[test]
    fn integers_are_counts_and_floats_are_fractions() {
        let limit: BatchLimit = serde_yaml::from_str("10").unwrap();
        assert_eq!(limit, BatchLimit::Count(10));
        let limit: BatchLimit = serde_yaml::from_str("0.25").unwrap();
        assert_eq!(limit, BatchLimit::Fraction(0.25));
        let interval: CheckInterval = serde_yaml::from_str("1.0").unwrap();
        assert_eq!(interval, CheckInterval::Fraction(1.0));
        let interval: CheckInterval = serde_yaml::from_str("500").unwrap();
        assert_eq!(interval, CheckInterval::Steps(500));
    }

    #[test]
    fn devices_forms() {
        let d: Devices = serde_yaml::from_str("auto").unwrap();
        assert!(d.is_auto());
        let d: Devices = serde_yaml::from_str("[0, 2]").unwrap();
        assert_eq!(d, Devices::Indices(vec![0, 2]));
        assert!(Devices::Spec("0,1".to_string()).check().is_ok());
        assert!(Devices::Spec("gpu0".to_string()).check().is_err());
        assert!(Devices::Count(0).check().is_err());
        assert!(Devices::Count(-1).check().is_ok());
    }
}
