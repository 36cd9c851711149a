//! Failure taxonomy for module definition, argument resolution and command
//! generation.
//!
//! Every variant names the module it came from. None of these are retried by
//! the core: they abort the Worker that hit them.

use std::fmt;
use std::path::PathBuf;

/// Phase in which a declared output key was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPhase {
    /// Single output entry of a plain tool module.
    Tool,
    /// Per-split output entries of a splitter.
    Split,
    /// Consolidated output entry of a merger.
    Merge,
}

impl fmt::Display for OutputPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool => f.write_str("tool"),
            Self::Split => f.write_str("split"),
            Self::Merge => f.write_str("merge"),
        }
    }
}

/// One `(output key, split index)` pair absent after output assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingOutput {
    pub key: String,
    pub split_index: usize,
}

impl fmt::Display for MissingOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "('{}', {})", self.key, self.split_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    /// The variant left part of its declarative contract unset.
    #[error("module '{module}' left contract attribute(s) unset: {}", .missing.join(", "))]
    Configuration {
        module: String,
        missing: Vec<&'static str>,
    },

    /// A mandatory argument has no value after scope scan and defaults.
    #[error("module '{module}': required argument '{argument}' could not be set ({detail})")]
    UnresolvedArgument {
        module: String,
        argument: String,
        detail: String,
    },

    /// A resolved argument has the wrong shape for how the module reads it.
    #[error("module '{module}': argument '{argument}' is invalid: {reason}")]
    InvalidArgument {
        module: String,
        argument: String,
        reason: String,
    },

    /// Two split entries map the same output key to an identical path.
    #[error(
        "module '{module}': output '{key}' at split {split_index} collides with split {existing_split} ({})",
        .path.display()
    )]
    OutputCollision {
        module: String,
        key: String,
        path: PathBuf,
        split_index: usize,
        existing_split: usize,
    },

    /// Declared output keys absent from one or more entries.
    #[error(
        "module '{module}' never generated required output(s) during {phase}: {}",
        .missing.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    )]
    MissingOutput {
        module: String,
        phase: OutputPhase,
        missing: Vec<MissingOutput>,
    },

    /// An output was recorded for a split that was never computed.
    #[error("module '{module}': split index {split_index} out of range ({nr_splits} split(s))")]
    SplitIndexOutOfRange {
        module: String,
        split_index: usize,
        nr_splits: usize,
    },

    /// A required variant method was not overridden.
    #[error("module '{module}' does not implement '{method}'")]
    UnimplementedContract {
        module: String,
        method: &'static str,
    },
}

impl ModuleError {
    /// Id of the module that raised this error.
    pub fn module_id(&self) -> &str {
        match self {
            Self::Configuration { module, .. }
            | Self::UnresolvedArgument { module, .. }
            | Self::InvalidArgument { module, .. }
            | Self::OutputCollision { module, .. }
            | Self::MissingOutput { module, .. }
            | Self::SplitIndexOutOfRange { module, .. }
            | Self::UnimplementedContract { module, .. } => module,
        }
    }

    pub(crate) fn invalid_argument(
        module: &str,
        argument: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            module: module.to_string(),
            argument: argument.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unimplemented(module: &str, method: &'static str) -> Self {
        Self::UnimplementedContract {
            module: module.to_string(),
            method,
        }
    }
}
