//! Closed set of module variants behind one dispatch surface.
//!
//! A [`StepModule`] is always initialized: construction runs the contract
//! check and `define_input`, so a Worker only ever sees modules whose
//! arguments are declared.

use std::fmt;

use crate::core::argument::ArgumentSet;
use crate::core::error::{ModuleError, OutputPhase};
use crate::core::merger::Merger;
use crate::core::module::{ModuleBase, Tool};
use crate::core::output::OutputSet;
use crate::core::platform::PlatformInfo;
use crate::core::splitter::Splitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Tool,
    Splitter,
    Merger,
    PseudoMerger,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool => f.write_str("tool"),
            Self::Splitter => f.write_str("splitter"),
            Self::Merger => f.write_str("merger"),
            Self::PseudoMerger => f.write_str("pseudo_merger"),
        }
    }
}

#[derive(Debug)]
pub enum StepModule {
    Tool(Box<dyn Tool>),
    Splitter(Box<dyn Splitter>),
    Merger(Box<dyn Merger>),
    /// Consumes many inputs without collapsing a preceding split.
    PseudoMerger(Box<dyn Merger>),
}

impl StepModule {
    pub fn tool(module: impl Tool + 'static) -> Result<Self, ModuleError> {
        Self::Tool(Box::new(module)).initialized()
    }

    pub fn splitter(module: impl Splitter + 'static) -> Result<Self, ModuleError> {
        Self::Splitter(Box::new(module)).initialized()
    }

    pub fn merger(module: impl Merger + 'static) -> Result<Self, ModuleError> {
        Self::Merger(Box::new(module)).initialized()
    }

    pub fn pseudo_merger(module: impl Merger + 'static) -> Result<Self, ModuleError> {
        Self::PseudoMerger(Box::new(module)).initialized()
    }

    fn initialized(mut self) -> Result<Self, ModuleError> {
        self.check_init()?;
        match &mut self {
            Self::Tool(m) => m.define_input()?,
            Self::Splitter(m) => m.define_input()?,
            Self::Merger(m) | Self::PseudoMerger(m) => m.define_input()?,
        }
        Ok(self)
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            Self::Tool(_) => ModuleKind::Tool,
            Self::Splitter(_) => ModuleKind::Splitter,
            Self::Merger(_) => ModuleKind::Merger,
            Self::PseudoMerger(_) => ModuleKind::PseudoMerger,
        }
    }

    /// True for mergers that close a fan-out opened by a splitter.
    pub fn collapses_splits(&self) -> bool {
        matches!(self, Self::Merger(_))
    }

    pub fn base(&self) -> &ModuleBase {
        match self {
            Self::Tool(m) => m.base(),
            Self::Splitter(m) => m.base(),
            Self::Merger(m) | Self::PseudoMerger(m) => m.base(),
        }
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        match self {
            Self::Tool(m) => m.base_mut(),
            Self::Splitter(m) => m.base_mut(),
            Self::Merger(m) | Self::PseudoMerger(m) => m.base_mut(),
        }
    }

    pub fn id(&self) -> &str {
        self.base().id()
    }

    /// Rename the tool a splitter or merger serves, as used in split file
    /// names.
    pub fn set_main_module_name(&mut self, name: impl Into<String>) {
        self.base_mut().set_main_module_name(name);
    }

    pub fn arguments(&self) -> &ArgumentSet {
        self.base().arguments()
    }

    pub(crate) fn arguments_mut(&mut self) -> &mut ArgumentSet {
        self.base_mut().arguments_mut()
    }

    pub fn output(&self) -> &OutputSet {
        self.base().output()
    }

    pub fn nr_splits(&self) -> usize {
        self.output().len()
    }

    pub fn check_init(&self) -> Result<(), ModuleError> {
        self.base().check_init()
    }

    pub fn check_input(&self, provided_keys: &[&str]) -> Vec<String> {
        self.base().check_input(provided_keys)
    }

    /// Build the step's command from resolved arguments.
    ///
    /// Output entries are rebuilt on every call and validated before the
    /// command is formatted. A blank command means "nothing to run".
    pub fn generate_command(
        &mut self,
        platform: &dyn PlatformInfo,
    ) -> Result<Option<String>, ModuleError> {
        let command = match self {
            Self::Tool(m) => {
                m.base_mut().reset_output(1);
                m.define_output(platform)?;
                check_outputs(m.base(), OutputPhase::Tool)?;
                m.define_command(platform)?
            }
            Self::Splitter(m) => {
                m.base_mut().reset_output(0);
                let splits = m.init_split_info(platform)?;
                m.base_mut().reset_output(splits.len());
                m.init_output_file_paths(&splits, platform)?;
                check_outputs(m.base(), OutputPhase::Split)?;
                m.define_command(&splits, platform)?
            }
            Self::Merger(m) | Self::PseudoMerger(m) => {
                m.base_mut().reset_output(1);
                m.define_output(platform)?;
                check_outputs(m.base(), OutputPhase::Merge)?;
                m.define_command(platform)?
            }
        };
        Ok(command.filter(|cmd| !cmd.trim().is_empty()))
    }
}

fn check_outputs(base: &ModuleBase, phase: OutputPhase) -> Result<(), ModuleError> {
    base.output()
        .check_complete(base.id(), base.output_keys(), phase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::argument::Argument;
    use crate::core::error::MissingOutput;
    use crate::core::module::{ModuleDef, SplitPathRequest};
    use crate::core::splitter::SplitDescriptor;
    use crate::test_support::test_platform;
    use std::path::Path;

    /// Splitter whose path assignment can deliberately skip a key.
    #[derive(Debug)]
    struct GappySplitter {
        base: ModuleBase,
        nr_splits: usize,
        skip_b_at: Option<usize>,
    }

    impl GappySplitter {
        fn new(nr_splits: usize, skip_b_at: Option<usize>) -> Self {
            Self {
                base: ModuleBase::new("gappy", "split_tool", "Main")
                    .with_input_keys(&[])
                    .with_output_keys(&["a", "b"])
                    .with_req_tools(&[])
                    .with_req_resources(&[]),
                nr_splits,
                skip_b_at,
            }
        }
    }

    impl ModuleDef for GappySplitter {
        fn base(&self) -> &ModuleBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut ModuleBase {
            &mut self.base
        }
        fn define_input(&mut self) -> Result<(), ModuleError> {
            self.base.add_argument(Argument::new("nr_cpus").default_value(1))
        }
    }

    impl Splitter for GappySplitter {
        fn init_split_info(
            &mut self,
            _platform: &dyn PlatformInfo,
        ) -> Result<Vec<SplitDescriptor>, ModuleError> {
            Ok((0..self.nr_splits).map(SplitDescriptor::new).collect())
        }

        fn init_output_file_paths(
            &mut self,
            splits: &[SplitDescriptor],
            platform: &dyn PlatformInfo,
        ) -> Result<(), ModuleError> {
            for split in splits {
                self.base.generate_split_output_path(
                    platform,
                    "a",
                    SplitPathRequest::new(split.index).extension("a"),
                )?;
                if self.skip_b_at != Some(split.index) {
                    self.base.generate_split_output_path(
                        platform,
                        "b",
                        SplitPathRequest::new(split.index).extension("b"),
                    )?;
                }
            }
            Ok(())
        }

        fn define_command(
            &self,
            splits: &[SplitDescriptor],
            _platform: &dyn PlatformInfo,
        ) -> Result<Option<String>, ModuleError> {
            Ok(Some(format!("split into {}", splits.len())))
        }
    }

    /// Module that implements nothing beyond its base.
    #[derive(Debug)]
    struct Bare {
        base: ModuleBase,
    }

    impl ModuleDef for Bare {
        fn base(&self) -> &ModuleBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut ModuleBase {
            &mut self.base
        }
        fn define_input(&mut self) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    impl Tool for Bare {}
    impl Splitter for Bare {}

    fn bare() -> Bare {
        Bare {
            base: ModuleBase::new("bare", "t", "Bare")
                .with_input_keys(&[])
                .with_output_keys(&[])
                .with_req_tools(&[])
                .with_req_resources(&[]),
        }
    }

    #[test]
    fn splitter_with_complete_outputs_generates_command() {
        let platform = test_platform();
        let mut module = StepModule::splitter(GappySplitter::new(3, None)).expect("init");

        let cmd = module.generate_command(&platform).expect("generate");
        assert_eq!(cmd.as_deref(), Some("split into 3"));
        assert_eq!(module.nr_splits(), 3);
        assert_eq!(
            module.output().path(2, "b"),
            Some(Path::new("/out/demo_Main_split_tool.splitter.split.2.b"))
        );
    }

    #[test]
    fn splitter_missing_key_fails_with_module_key_and_index() {
        let platform = test_platform();
        let mut module = StepModule::splitter(GappySplitter::new(3, Some(2))).expect("init");

        let err = module.generate_command(&platform).unwrap_err();
        assert_eq!(
            err,
            ModuleError::MissingOutput {
                module: "gappy".to_string(),
                phase: OutputPhase::Split,
                missing: vec![MissingOutput {
                    key: "b".to_string(),
                    split_index: 2,
                }],
            }
        );
    }

    #[test]
    fn regenerating_resets_previous_outputs() {
        let platform = test_platform();
        let mut module = StepModule::splitter(GappySplitter::new(2, None)).expect("init");
        module.generate_command(&platform).expect("first");
        module.generate_command(&platform).expect("second");
        assert_eq!(module.nr_splits(), 2);
    }

    #[test]
    fn construction_fails_on_unset_contract() {
        let mut incomplete = bare();
        incomplete.base = ModuleBase::new("bare", "t", "Bare");
        let err = StepModule::tool(incomplete).unwrap_err();
        assert!(matches!(err, ModuleError::Configuration { .. }));
    }

    #[test]
    fn unimplemented_hooks_name_module_and_method() {
        let platform = test_platform();

        let mut tool = StepModule::tool(bare()).expect("init");
        let err = tool.generate_command(&platform).unwrap_err();
        assert_eq!(
            err,
            ModuleError::UnimplementedContract {
                module: "bare".to_string(),
                method: "define_output",
            }
        );

        let mut splitter = StepModule::splitter(bare()).expect("init");
        let err = splitter.generate_command(&platform).unwrap_err();
        assert!(matches!(
            err,
            ModuleError::UnimplementedContract {
                method: "init_split_info",
                ..
            }
        ));
    }

    #[test]
    fn kinds_and_split_collapse() {
        let tool = StepModule::tool(bare()).expect("init");
        assert_eq!(tool.kind(), ModuleKind::Tool);
        assert!(!tool.collapses_splits());
        assert_eq!(tool.id(), "bare");
    }
}
