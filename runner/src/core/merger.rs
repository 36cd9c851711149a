//! Fan-in variants: consume N per-split outputs, emit one output entry.
//!
//! Upstream split outputs reach a merger through an ordinary scope: the
//! orchestrator gathers them with [`collect_split_outputs`] and passes the
//! result as the merger's module scope, so each key resolves to the list of
//! per-split paths in split order.

use serde_json::Value;

use crate::core::error::ModuleError;
use crate::core::module::ModuleDef;
use crate::core::output::OutputMap;
use crate::core::platform::PlatformInfo;
use crate::core::scope::ScopeMap;

/// Shared hooks for `Merger` and `PseudoMerger` variants.
pub trait Merger: ModuleDef {
    /// Record the consolidated outputs with
    /// [`crate::core::module::ModuleBase::add_output`].
    fn define_output(&mut self, _platform: &dyn PlatformInfo) -> Result<(), ModuleError> {
        Err(ModuleError::unimplemented(self.base().id(), "define_output"))
    }

    fn define_command(&self, _platform: &dyn PlatformInfo) -> Result<Option<String>, ModuleError> {
        Err(ModuleError::unimplemented(self.base().id(), "define_command"))
    }
}

/// Gather per-split output maps into key → list of paths, in split order.
///
/// Keys missing from some splits only list the splits that have them;
/// consistency across splits is the producing module's concern.
pub fn collect_split_outputs<'a>(entries: impl IntoIterator<Item = &'a OutputMap>) -> ScopeMap {
    let mut gathered = ScopeMap::new();
    for entry in entries {
        for (key, path) in entry {
            let slot = gathered
                .entry(key.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = slot {
                items.push(Value::String(path.display().to_string()));
            }
        }
    }
    gathered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn entry(pairs: &[(&str, &str)]) -> OutputMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), PathBuf::from(v)))
            .collect()
    }

    #[test]
    fn gathers_paths_in_split_order() {
        let entries = [
            entry(&[("vcf", "/o/s0.vcf"), ("idx", "/o/s0.idx")]),
            entry(&[("vcf", "/o/s1.vcf"), ("idx", "/o/s1.idx")]),
        ];
        let gathered = collect_split_outputs(&entries);
        assert_eq!(gathered.get("vcf"), Some(&json!(["/o/s0.vcf", "/o/s1.vcf"])));
        assert_eq!(gathered.get("idx"), Some(&json!(["/o/s0.idx", "/o/s1.idx"])));
    }

    #[test]
    fn no_entries_gathers_nothing() {
        let entries: Vec<OutputMap> = Vec::new();
        assert!(collect_split_outputs(&entries).is_empty());
    }
}
