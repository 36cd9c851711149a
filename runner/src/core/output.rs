//! Output path bookkeeping for modules.
//!
//! A module's output is a list of key → path maps, one per split (a single
//! entry for non-splitting modules). Within one module instance no two
//! distinct split indices may map the same key to the same path.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::error::{MissingOutput, ModuleError, OutputPhase};

/// Output key → path for one split.
pub type OutputMap = IndexMap<String, PathBuf>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OutputSet {
    entries: Vec<OutputMap>,
}

impl OutputSet {
    /// Replace all entries with `nr_entries` empty maps.
    pub fn reset(&mut self, nr_entries: usize) {
        self.entries = vec![OutputMap::new(); nr_entries];
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[OutputMap] {
        &self.entries
    }

    pub fn get(&self, split_index: usize) -> Option<&OutputMap> {
        self.entries.get(split_index)
    }

    /// Path of `key` in split `split_index`.
    pub fn path(&self, split_index: usize, key: &str) -> Option<&Path> {
        self.entries
            .get(split_index)
            .and_then(|entry| entry.get(key))
            .map(PathBuf::as_path)
    }

    /// Record `path` for `key` at `split_index`.
    ///
    /// Re-assigning the same `(key, split_index)` overwrites. The same path
    /// under the same key at any other split index is a collision.
    pub fn assign(
        &mut self,
        module_id: &str,
        split_index: usize,
        key: &str,
        path: PathBuf,
    ) -> Result<(), ModuleError> {
        if split_index >= self.entries.len() {
            return Err(ModuleError::SplitIndexOutOfRange {
                module: module_id.to_string(),
                split_index,
                nr_splits: self.entries.len(),
            });
        }
        self.check_collision(module_id, split_index, key, &path)?;
        self.entries[split_index].insert(key.to_string(), path);
        Ok(())
    }

    fn check_collision(
        &self,
        module_id: &str,
        split_index: usize,
        key: &str,
        path: &Path,
    ) -> Result<(), ModuleError> {
        let existing = self
            .entries
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != split_index)
            .find(|(_, entry)| entry.get(key).is_some_and(|p| p == path));

        match existing {
            Some((existing_split, _)) => Err(ModuleError::OutputCollision {
                module: module_id.to_string(),
                key: key.to_string(),
                path: path.to_path_buf(),
                split_index,
                existing_split,
            }),
            None => Ok(()),
        }
    }

    /// Every `(key, split_index)` pair absent, keys in declaration order.
    pub fn missing(&self, output_keys: &[String]) -> Vec<MissingOutput> {
        output_keys
            .iter()
            .flat_map(|key| {
                self.entries
                    .iter()
                    .enumerate()
                    .filter(move |(_, entry)| !entry.contains_key(key))
                    .map(move |(split_index, _)| MissingOutput {
                        key: key.clone(),
                        split_index,
                    })
            })
            .collect()
    }

    /// Fail once with the complete list of missing pairs, if any.
    pub fn check_complete(
        &self,
        module_id: &str,
        output_keys: &[String],
        phase: OutputPhase,
    ) -> Result<(), ModuleError> {
        let missing = self.missing(output_keys);
        if missing.is_empty() {
            return Ok(());
        }
        Err(ModuleError::MissingOutput {
            module: module_id.to_string(),
            phase,
            missing,
        })
    }
}

/// Label distinguishing one split in generated file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitLabel<'a> {
    Name(&'a str),
    Index(usize),
}

/// Inputs to the split file naming convention.
#[derive(Debug, Clone, Copy)]
pub struct SplitFileName<'a> {
    pub pipeline_name: &'a str,
    pub main_module_name: &'a str,
    pub tool_id: &'a str,
    pub label: SplitLabel<'a>,
    pub extension: Option<&'a str>,
}

impl SplitFileName<'_> {
    /// `{pipeline}_{main_module}_{tool}.splitter.split.{name|index}.{ext}`
    pub fn render(&self) -> String {
        let label = match self.label {
            SplitLabel::Name(name) => name.to_string(),
            SplitLabel::Index(index) => index.to_string(),
        };
        format!(
            "{}_{}_{}.splitter.split.{}{}",
            self.pipeline_name,
            self.main_module_name,
            self.tool_id,
            label,
            extension_suffix(self.extension)
        )
    }
}

/// `.ext` with any leading dots of `ext` collapsed; empty when absent.
pub fn extension_suffix(extension: Option<&str>) -> String {
    match extension.map(|ext| ext.trim_start_matches('.')) {
        Some(ext) if !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    }
}
