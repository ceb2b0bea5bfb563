use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Config `{name}` not found (looked for {path:?})")]
    MissingConfig { name: String, path: PathBuf },

    #[error("Invalid defaults list in {origin}: {reason}")]
    InvalidDefaults { origin: String, reason: String },

    #[error("Invalid override `{input}`: {reason}")]
    InvalidOverride { input: String, reason: String },

    #[error("Could not resolve `{reference}` in `{field}` (from {origin}): {reason}")]
    Resolution {
        field: String,
        reference: String,
        origin: String,
        reason: String,
    },

    #[error("Type mismatch for `{field}` (from {origin}): expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        origin: String,
        expected: String,
        found: String,
    },

    #[error("Unknown option `{field}` (from {origin})")]
    UnknownOption { field: String, origin: String },

    #[error("Unknown target `{target}` for `{field}`")]
    UnknownTarget { field: String, target: String },

    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
