//! Configuration resolver: composes YAML sources into one tree, substitutes
//! `${...}` interpolations and builds typed targets from explicit factory
//! tables.
//!
//! ```text
//! ConfigSource::load -> compose -> apply_overrides -> resolve -> Registry::instantiate
//! ```

pub mod compose;
pub mod error;
pub mod interpolate;
pub mod loader;
pub mod node;
pub mod overrides;
pub mod registry;
pub mod schema;
pub mod tree;

pub use compose::{compose, Composed, Fragment, Origins};
pub use error::{ConfigError, Result};
pub use interpolate::{resolve, Resolved, Resolvers};
pub use loader::{ConfigSource, GroupChoices};
pub use overrides::{apply_overrides, split_overrides, Override, OverrideKind};
pub use registry::{Args, Registry};
pub use schema::{FieldSpec, FieldType};
pub use tree::render_tree;

/// How unknown option keys are treated.
///
/// Strict rejects them with [`ConfigError::UnknownOption`]; lenient logs a
/// warning and drops them from targets (or adds them, for command-line
/// overrides).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    #[default]
    Strict,
    Lenient,
}
