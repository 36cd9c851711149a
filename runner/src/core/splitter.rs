//! Fan-out variant: partitions one logical input into N splits.
//!
//! Command generation for a splitter is a single linear pass, driven by
//! [`crate::core::step_module::StepModule::generate_command`]:
//!
//! 1. reset output to an empty list
//! 2. [`Splitter::init_split_info`] computes the split descriptors
//! 3. one empty output entry is allocated per descriptor
//! 4. [`Splitter::init_output_file_paths`] assigns paths per split and key
//! 5. every declared key is checked in every entry; all gaps are reported
//!    together
//! 6. [`Splitter::define_command`] builds the split command

use std::ops::Range;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::error::ModuleError;
use crate::core::module::ModuleDef;
use crate::core::platform::PlatformInfo;

/// One fan-out partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitDescriptor {
    pub index: usize,
    /// Human-readable label used in file names instead of the index.
    pub name: Option<String>,
    /// Partition-specific parameters (ranges, intervals, ...).
    pub params: Map<String, Value>,
}

impl SplitDescriptor {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            name: None,
            params: Map::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

pub trait Splitter: ModuleDef {
    /// Compute the split descriptors from resolved arguments.
    fn init_split_info(
        &mut self,
        _platform: &dyn PlatformInfo,
    ) -> Result<Vec<SplitDescriptor>, ModuleError> {
        Err(ModuleError::unimplemented(self.base().id(), "init_split_info"))
    }

    /// Assign an output path for every split and declared key, usually via
    /// [`crate::core::module::ModuleBase::generate_split_output_path`].
    fn init_output_file_paths(
        &mut self,
        _splits: &[SplitDescriptor],
        _platform: &dyn PlatformInfo,
    ) -> Result<(), ModuleError> {
        Err(ModuleError::unimplemented(
            self.base().id(),
            "init_output_file_paths",
        ))
    }

    /// Command producing every split's output files.
    fn define_command(
        &self,
        _splits: &[SplitDescriptor],
        _platform: &dyn PlatformInfo,
    ) -> Result<Option<String>, ModuleError> {
        Err(ModuleError::unimplemented(self.base().id(), "define_command"))
    }
}

/// Partition `total` items into consecutive chunks of at most `chunk_size`.
///
/// Never yields an empty trailing chunk; `total == 0` yields no chunks.
/// Returns `None` when `chunk_size` is zero.
pub fn split_ranges(total: u64, chunk_size: u64) -> Option<Vec<Range<u64>>> {
    if chunk_size == 0 {
        return None;
    }
    let ranges = (0..total.div_ceil(chunk_size))
        .map(|i| {
            let start = i * chunk_size;
            start..start.saturating_add(chunk_size).min(total)
        })
        .collect();
    Some(ranges)
}
