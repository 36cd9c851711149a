//! Module contract shared by every step variant.
//!
//! A variant owns a [`ModuleBase`] holding its declarative contract
//! (input/output keys, required tools and resources), its arguments and its
//! output entries. The variant traits ([`Tool`], [`crate::core::splitter::Splitter`],
//! [`crate::core::merger::Merger`]) only add the hooks that differ.

use std::fmt;
use std::path::PathBuf;

use serde_json::Value;

use crate::core::argument::{Argument, ArgumentSet, value_as_u64};
use crate::core::error::{ModuleError, OutputPhase};
use crate::core::output::{OutputSet, SplitFileName, SplitLabel, extension_suffix};
use crate::core::platform::PlatformInfo;

/// Declarative state common to every module variant.
#[derive(Debug, Clone)]
pub struct ModuleBase {
    id: String,
    tool_id: String,
    main_module_name: String,
    input_keys: Option<Vec<String>>,
    output_keys: Option<Vec<String>>,
    req_tools: Option<Vec<String>>,
    req_resources: Option<Vec<String>>,
    arguments: ArgumentSet,
    output: OutputSet,
}

impl ModuleBase {
    /// `main_module_name` ties a splitter or merger to the tool it serves;
    /// for standalone modules it is the module's own type name.
    pub fn new(
        id: impl Into<String>,
        tool_id: impl Into<String>,
        main_module_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_id: tool_id.into(),
            main_module_name: main_module_name.into(),
            input_keys: None,
            output_keys: None,
            req_tools: None,
            req_resources: None,
            arguments: ArgumentSet::new(),
            output: OutputSet::default(),
        }
    }

    pub fn with_input_keys(mut self, keys: &[&str]) -> Self {
        self.input_keys = Some(owned(keys));
        self
    }

    pub fn with_output_keys(mut self, keys: &[&str]) -> Self {
        self.output_keys = Some(owned(keys));
        self
    }

    pub fn with_req_tools(mut self, tools: &[&str]) -> Self {
        self.req_tools = Some(owned(tools));
        self
    }

    pub fn with_req_resources(mut self, resources: &[&str]) -> Self {
        self.req_resources = Some(owned(resources));
        self
    }

    pub fn set_main_module_name(&mut self, name: impl Into<String>) {
        self.main_module_name = name.into();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    pub fn main_module_name(&self) -> &str {
        &self.main_module_name
    }

    pub fn input_keys(&self) -> &[String] {
        self.input_keys.as_deref().unwrap_or_default()
    }

    pub fn output_keys(&self) -> &[String] {
        self.output_keys.as_deref().unwrap_or_default()
    }

    pub fn req_tools(&self) -> &[String] {
        self.req_tools.as_deref().unwrap_or_default()
    }

    pub fn req_resources(&self) -> &[String] {
        self.req_resources.as_deref().unwrap_or_default()
    }

    /// Fail if any part of the declarative contract is unset.
    pub fn check_init(&self) -> Result<(), ModuleError> {
        let missing: Vec<&'static str> = [
            ("input_keys", self.input_keys.is_none()),
            ("output_keys", self.output_keys.is_none()),
            ("req_tools", self.req_tools.is_none()),
            ("req_resources", self.req_resources.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, unset)| unset.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ModuleError::Configuration {
                module: self.id.clone(),
                missing,
            })
        }
    }

    /// Declared input keys absent from `provided_keys`, in declaration order.
    pub fn check_input(&self, provided_keys: &[&str]) -> Vec<String> {
        self.input_keys()
            .iter()
            .filter(|key| !provided_keys.contains(&key.as_str()))
            .cloned()
            .collect()
    }

    pub fn add_argument(&mut self, argument: Argument) -> Result<(), ModuleError> {
        self.arguments.add(&self.id, argument)
    }

    pub fn arguments(&self) -> &ArgumentSet {
        &self.arguments
    }

    pub(crate) fn arguments_mut(&mut self) -> &mut ArgumentSet {
        &mut self.arguments
    }

    /// Resolved value of an argument; `None` if unset.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.value(name)
    }

    /// Resolved value of an argument the command cannot do without.
    /// `null` counts as missing here.
    pub fn required_argument(&self, name: &str) -> Result<&Value, ModuleError> {
        match self.arguments.value(name) {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(ModuleError::UnresolvedArgument {
                module: self.id.clone(),
                argument: name.to_string(),
                detail: "read during command generation before being set".to_string(),
            }),
        }
    }

    /// Resolved argument read as a non-negative integer.
    pub fn argument_u64(&self, name: &str) -> Result<u64, ModuleError> {
        let value = self.required_argument(name)?;
        value_as_u64(value).ok_or_else(|| {
            ModuleError::invalid_argument(
                &self.id,
                name,
                format!("expected a non-negative integer, got {value}"),
            )
        })
    }

    pub fn output(&self) -> &OutputSet {
        &self.output
    }

    pub(crate) fn reset_output(&mut self, nr_entries: usize) {
        self.output.reset(nr_entries);
    }

    /// Record an output of a single-entry (non-splitting) module.
    pub fn add_output(&mut self, key: &str, path: impl Into<PathBuf>) -> Result<(), ModuleError> {
        self.output.assign(&self.id, 0, key, path.into())
    }

    /// Path recorded for `key` in the single output entry.
    pub fn output_path(&self, key: &str) -> Result<String, ModuleError> {
        self.output
            .path(0, key)
            .map(|p| p.display().to_string())
            .ok_or_else(|| ModuleError::MissingOutput {
                module: self.id.clone(),
                phase: OutputPhase::Tool,
                missing: vec![crate::core::error::MissingOutput {
                    key: key.to_string(),
                    split_index: 0,
                }],
            })
    }

    /// `{output_dir}/{pipeline}_{module_id}[.{split_name}].{extension}`
    pub fn generate_unique_file_name(
        &self,
        platform: &dyn PlatformInfo,
        extension: &str,
        split_name: Option<&str>,
    ) -> PathBuf {
        let split = split_name.map(|name| format!(".{name}")).unwrap_or_default();
        let file_name = format!(
            "{}_{}{}{}",
            platform.pipeline_name(),
            self.id,
            split,
            extension_suffix(Some(extension))
        );
        platform.output_dir().join(file_name)
    }

    /// Assign the path of `key` for one split and return it.
    ///
    /// An explicit path is used as-is; otherwise the split naming convention
    /// is applied under the platform output directory.
    pub fn generate_split_output_path(
        &mut self,
        platform: &dyn PlatformInfo,
        key: &str,
        request: SplitPathRequest<'_>,
    ) -> Result<PathBuf, ModuleError> {
        let path = match request.explicit_path {
            Some(path) => path,
            None => {
                let label = match request.split_name {
                    Some(name) => SplitLabel::Name(name),
                    None => SplitLabel::Index(request.split_index),
                };
                let name = SplitFileName {
                    pipeline_name: platform.pipeline_name(),
                    main_module_name: &self.main_module_name,
                    tool_id: &self.tool_id,
                    label,
                    extension: request.extension,
                };
                platform.output_dir().join(name.render())
            }
        };
        self.output
            .assign(&self.id, request.split_index, key, path.clone())?;
        Ok(path)
    }
}

/// Per-call options for [`ModuleBase::generate_split_output_path`].
#[derive(Debug, Clone, Default)]
pub struct SplitPathRequest<'a> {
    pub split_index: usize,
    pub split_name: Option<&'a str>,
    pub extension: Option<&'a str>,
    pub explicit_path: Option<PathBuf>,
}

impl<'a> SplitPathRequest<'a> {
    pub fn new(split_index: usize) -> Self {
        Self {
            split_index,
            ..Self::default()
        }
    }

    pub fn name(mut self, split_name: Option<&'a str>) -> Self {
        self.split_name = split_name;
        self
    }

    pub fn extension(mut self, extension: &'a str) -> Self {
        self.extension = Some(extension);
        self
    }

    pub fn explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Hooks every variant shares.
pub trait ModuleDef: Send + fmt::Debug {
    fn base(&self) -> &ModuleBase;

    fn base_mut(&mut self) -> &mut ModuleBase;

    /// Register all arguments on the base.
    fn define_input(&mut self) -> Result<(), ModuleError> {
        Err(ModuleError::unimplemented(self.base().id(), "define_input"))
    }
}

/// A plain, non-splitting module: one output entry, one command.
pub trait Tool: ModuleDef {
    /// Record the module's outputs with [`ModuleBase::add_output`].
    fn define_output(&mut self, _platform: &dyn PlatformInfo) -> Result<(), ModuleError> {
        Err(ModuleError::unimplemented(self.base().id(), "define_output"))
    }

    /// Command from resolved arguments and recorded outputs; `None` when
    /// there is nothing to run.
    fn define_command(&self, _platform: &dyn PlatformInfo) -> Result<Option<String>, ModuleError> {
        Err(ModuleError::unimplemented(self.base().id(), "define_command"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_platform;
    use std::path::Path;

    fn complete_base() -> ModuleBase {
        ModuleBase::new("qc1", "qc_parser", "ParseQc")
            .with_input_keys(&["report", "nr_cpus"])
            .with_output_keys(&["qc_report"])
            .with_req_tools(&["qc_parser"])
            .with_req_resources(&[])
    }

    #[test]
    fn check_init_passes_once_all_attributes_set() {
        assert!(complete_base().check_init().is_ok());
    }

    #[test]
    fn check_init_fails_for_each_unset_attribute() {
        let cases: [(ModuleBase, &str); 4] = [
            (
                ModuleBase::new("m", "t", "M")
                    .with_output_keys(&[])
                    .with_req_tools(&[])
                    .with_req_resources(&[]),
                "input_keys",
            ),
            (
                ModuleBase::new("m", "t", "M")
                    .with_input_keys(&[])
                    .with_req_tools(&[])
                    .with_req_resources(&[]),
                "output_keys",
            ),
            (
                ModuleBase::new("m", "t", "M")
                    .with_input_keys(&[])
                    .with_output_keys(&[])
                    .with_req_resources(&[]),
                "req_tools",
            ),
            (
                ModuleBase::new("m", "t", "M")
                    .with_input_keys(&[])
                    .with_output_keys(&[])
                    .with_req_tools(&[]),
                "req_resources",
            ),
        ];
        for (base, attribute) in cases {
            let err = base.check_init().unwrap_err();
            assert_eq!(
                err,
                ModuleError::Configuration {
                    module: "m".to_string(),
                    missing: vec![attribute],
                }
            );
        }
    }

    #[test]
    fn check_init_reports_every_unset_attribute() {
        let err = ModuleBase::new("m", "t", "M").check_init().unwrap_err();
        assert!(matches!(err, ModuleError::Configuration { ref missing, .. } if missing.len() == 4));
    }

    #[test]
    fn check_input_lists_absent_keys_in_order() {
        let base = complete_base();
        assert_eq!(base.check_input(&["nr_cpus"]), vec!["report".to_string()]);
        assert!(base.check_input(&["report", "nr_cpus", "extra"]).is_empty());
    }

    #[test]
    fn unique_file_name_uses_pipeline_and_module_id() {
        let platform = test_platform();
        let base = complete_base();
        assert_eq!(
            base.generate_unique_file_name(&platform, ".qc_report.json", None),
            Path::new("/out/demo_qc1.qc_report.json")
        );
        assert_eq!(
            base.generate_unique_file_name(&platform, "bam", Some("chr2")),
            Path::new("/out/demo_qc1.chr2.bam")
        );
    }

    #[test]
    fn split_output_path_uses_convention_or_explicit_path() {
        let platform = test_platform();
        let mut base = ModuleBase::new("split1", "fastq_split", "Bwa")
            .with_output_keys(&["R1"]);
        base.reset_output(2);

        let generated = base
            .generate_split_output_path(
                &platform,
                "R1",
                SplitPathRequest::new(0).extension("fastq"),
            )
            .expect("generated");
        assert_eq!(
            generated,
            Path::new("/out/demo_Bwa_fastq_split.splitter.split.0.fastq")
        );

        let explicit = base
            .generate_split_output_path(
                &platform,
                "R1",
                SplitPathRequest::new(1)
                    .name(Some("lane2"))
                    .explicit("/data/custom.fastq"),
            )
            .expect("explicit");
        assert_eq!(explicit, Path::new("/data/custom.fastq"));
        assert_eq!(base.output().path(1, "R1"), Some(Path::new("/data/custom.fastq")));
    }

    #[test]
    fn required_argument_rejects_unset_and_null() {
        let mut base = complete_base();
        base.add_argument(Argument::new("note")).unwrap();
        base.add_argument(Argument::new("mem")).unwrap();
        base.arguments_mut()
            .iter_mut()
            .for_each(|arg| match arg.name() {
                "note" => arg.set(Value::Null),
                _ => arg.set(Value::from("lots")),
            });

        assert!(base.required_argument("note").is_err());
        assert!(base.required_argument("absent").is_err());
        let err = base.argument_u64("mem").unwrap_err();
        assert!(matches!(err, ModuleError::InvalidArgument { ref argument, .. } if argument == "mem"));
    }
}
