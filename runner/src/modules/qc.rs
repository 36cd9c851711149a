//! QC report parsers: turn a tool's raw report into a JSON summary.

use crate::core::argument::{Argument, display_value};
use crate::core::error::ModuleError;
use crate::core::module::{ModuleBase, ModuleDef, Tool};
use crate::core::platform::PlatformInfo;

const QC_REPORT: &str = "qc_report";

/// `{qc_parser} <subcommand> -i <input> -s <sample> [-n "<note>"] > <report> !LOG2!`
fn parser_command(
    base: &ModuleBase,
    subcommand: &str,
    input_argument: &str,
) -> Result<Option<String>, ModuleError> {
    let qc_parser = display_value(base.required_argument("qc_parser")?);
    let input = display_value(base.required_argument(input_argument)?);
    let sample_name = display_value(base.required_argument("sample_name")?);
    let report = base.output_path(QC_REPORT)?;

    let mut cmd = format!("{qc_parser} {subcommand} -i {input} -s {sample_name}");
    if let Some(note) = base.argument("note").filter(|note| !note.is_null()) {
        cmd.push_str(&format!(" -n \"{}\"", display_value(note)));
    }
    cmd.push_str(&format!(" > {report} !LOG2!"));
    Ok(Some(cmd))
}

fn parser_base(id: &str, tool_id: &str, main_module_name: &str, input_key: &str) -> ModuleBase {
    ModuleBase::new(id, tool_id, main_module_name)
        .with_input_keys(&[input_key, "qc_parser", "note", "nr_cpus", "mem"])
        .with_output_keys(&[QC_REPORT])
        .with_req_tools(&["qc_parser"])
        .with_req_resources(&[])
}

fn add_parser_arguments(
    base: &mut ModuleBase,
    input_argument: &str,
    nr_cpus: u64,
    mem: u64,
) -> Result<(), ModuleError> {
    base.add_argument(Argument::new(input_argument).mandatory())?;
    base.add_argument(Argument::new("sample_name").mandatory())?;
    base.add_argument(Argument::new("note").default_value(serde_json::Value::Null))?;
    base.add_argument(Argument::new("qc_parser").mandatory().resource())?;
    base.add_argument(Argument::new("nr_cpus").mandatory().default_value(nr_cpus))?;
    base.add_argument(Argument::new("mem").mandatory().default_value(mem))
}

/// Summarizes a Trimmomatic trim log.
#[derive(Debug)]
pub struct ParseTrimmomatic {
    base: ModuleBase,
}

impl ParseTrimmomatic {
    pub fn new(id: &str) -> Self {
        Self {
            base: parser_base(id, "trimmomatic_parser", "ParseTrimmomatic", "trim_report"),
        }
    }
}

impl ModuleDef for ParseTrimmomatic {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    fn define_input(&mut self) -> Result<(), ModuleError> {
        add_parser_arguments(&mut self.base, "trim_report", 1, 1)
    }
}

impl Tool for ParseTrimmomatic {
    fn define_output(&mut self, platform: &dyn PlatformInfo) -> Result<(), ModuleError> {
        let summary =
            self.base
                .generate_unique_file_name(platform, ".trimmomatic.qc_report.json", None);
        self.base.add_output(QC_REPORT, summary)
    }

    fn define_command(&self, _platform: &dyn PlatformInfo) -> Result<Option<String>, ModuleError> {
        parser_command(&self.base, "Trimmomatic", "trim_report")
    }
}

/// Summarizes a `bedtools intersect` capture report.
#[derive(Debug)]
pub struct ParseBedtoolsIntersect {
    base: ModuleBase,
}

impl ParseBedtoolsIntersect {
    pub fn new(id: &str) -> Self {
        Self {
            base: parser_base(
                id,
                "bedtools_intersect_parser",
                "ParseBedtoolsIntersect",
                "capture_bed",
            ),
        }
    }
}

impl ModuleDef for ParseBedtoolsIntersect {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    fn define_input(&mut self) -> Result<(), ModuleError> {
        add_parser_arguments(&mut self.base, "capture_bed", 2, 12)
    }
}

impl Tool for ParseBedtoolsIntersect {
    fn define_output(&mut self, platform: &dyn PlatformInfo) -> Result<(), ModuleError> {
        let summary =
            self.base
                .generate_unique_file_name(platform, ".bedintersect.qc_report.json", None);
        self.base.add_output(QC_REPORT, summary)
    }

    fn define_command(&self, _platform: &dyn PlatformInfo) -> Result<Option<String>, ModuleError> {
        parser_command(&self.base, "BedtoolsIntersect", "capture_bed")
    }
}
