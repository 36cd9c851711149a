//! GATK-based mergers.
//!
//! Heap sizes are whole gigabytes derived from `mem` with truncating integer
//! division, so `mem = 13` gives `-Xmx11G` at 9/10.

use serde_json::Value;

use crate::core::argument::{Argument, display_value, value_items};
use crate::core::error::ModuleError;
use crate::core::merger::Merger;
use crate::core::module::{ModuleBase, ModuleDef};
use crate::core::platform::PlatformInfo;

const JVM_TMP_DIR: &str = "/tmp/";

/// Heap as a fraction of `mem`, rounded down. `None` on overflow.
pub fn heap_gb(mem: u64, numerator: u64, denominator: u64) -> Option<u64> {
    mem.checked_mul(numerator)?.checked_div(denominator)
}

fn heap_from_mem(base: &ModuleBase, numerator: u64, denominator: u64) -> Result<u64, ModuleError> {
    let mem = base.argument_u64("mem")?;
    heap_gb(mem, numerator, denominator).ok_or_else(|| {
        ModuleError::invalid_argument(
            base.id(),
            "mem",
            format!("{mem} GB is too large to size a JVM heap"),
        )
    })
}

/// Major version from values like `"3.8"`, `"GATK4"` or `4`.
pub fn parse_major_version(value: &Value) -> Option<u32> {
    let text = display_value(value).to_lowercase().replace("gatk", "");
    text.trim().split('.').next()?.trim().parse().ok()
}

/// GATK 3 writes with `-o`, GATK 4 and later with `-O`.
pub fn output_flag(major_version: u32) -> &'static str {
    if major_version < 4 { "-o" } else { "-O" }
}

fn gatk_version(base: &ModuleBase) -> Result<u32, ModuleError> {
    let value = base.required_argument("gatk_version")?;
    parse_major_version(value).ok_or_else(|| {
        ModuleError::invalid_argument(
            base.id(),
            "gatk_version",
            format!("cannot read a GATK major version from {value}"),
        )
    })
}

/// `java -Xmx<mem*4/5>G ... -jar gatk`, plus `-T` before GATK 4.
fn gatk_command(base: &ModuleBase, version: u32) -> Result<String, ModuleError> {
    let java = display_value(base.required_argument("java")?);
    let gatk = display_value(base.required_argument("gatk")?);
    let heap = heap_from_mem(base, 4, 5)?;
    let mut cmd = format!("{java} -Xmx{heap}G -Djava.io.tmpdir={JVM_TMP_DIR} -jar {gatk}");
    if version < 4 {
        cmd.push_str(" -T");
    }
    Ok(cmd)
}

/// `-L`/`-XL` options for `location` and `excluded_location`.
///
/// With `skip_unmapped`, an `unmapped` entry in a location list is dropped;
/// it is only meaningful to tools that read BAMs.
fn location_options(base: &ModuleBase, skip_unmapped: bool) -> Vec<String> {
    let mut opts = Vec::new();
    if let Some(location) = base.argument("location") {
        let is_list = location.is_array();
        opts.extend(
            value_items(location)
                .into_iter()
                .filter(|l| !(skip_unmapped && is_list && l == "unmapped"))
                .map(|l| format!("-L \"{l}\"")),
        );
    }
    if let Some(excluded) = base.argument("excluded_location") {
        opts.extend(
            value_items(excluded)
                .into_iter()
                .map(|l| format!("-XL \"{l}\"")),
        );
    }
    opts
}

fn add_gatk_tool_arguments(base: &mut ModuleBase) -> Result<(), ModuleError> {
    base.add_argument(Argument::new("java").mandatory().resource())?;
    base.add_argument(Argument::new("gatk").mandatory().resource())?;
    base.add_argument(Argument::new("gatk_version").mandatory())
}

fn add_reference_arguments(base: &mut ModuleBase) -> Result<(), ModuleError> {
    base.add_argument(Argument::new("ref").mandatory().resource())?;
    base.add_argument(Argument::new("ref_idx").mandatory().resource())?;
    base.add_argument(Argument::new("ref_dict").mandatory().resource())?;
    base.add_argument(Argument::new("location"))?;
    base.add_argument(Argument::new("excluded_location"))
}

fn add_capacity(base: &mut ModuleBase, nr_cpus: u64, mem: u64) -> Result<(), ModuleError> {
    base.add_argument(Argument::new("nr_cpus").mandatory().default_value(nr_cpus))?;
    base.add_argument(Argument::new("mem").mandatory().default_value(mem))
}

fn merger_base(id: &str, tool_id: &str, main: &str, inputs: &[&str], outputs: &[&str]) -> ModuleBase {
    ModuleBase::new(id, tool_id, main)
        .with_input_keys(inputs)
        .with_output_keys(outputs)
        .with_req_tools(&["java", "gatk"])
        .with_req_resources(&["ref", "ref_idx", "ref_dict"])
}

/// Concatenates per-interval gVCFs of one sample back into one gVCF.
#[derive(Debug)]
pub struct CatVariants {
    base: ModuleBase,
}

impl CatVariants {
    pub fn new(id: &str) -> Self {
        Self {
            base: merger_base(
                id,
                "cat_variants",
                "CatVariants",
                &["gvcf", "gvcf_idx"],
                &["gvcf", "gvcf_idx"],
            ),
        }
    }
}

impl ModuleDef for CatVariants {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    fn define_input(&mut self) -> Result<(), ModuleError> {
        add_gatk_tool_arguments(&mut self.base)?;
        add_reference_arguments(&mut self.base)?;
        self.base.add_argument(Argument::new("gvcf").mandatory())?;
        self.base.add_argument(Argument::new("gvcf_idx").mandatory())?;
        add_capacity(&mut self.base, 2, 13)
    }
}

impl Merger for CatVariants {
    fn define_output(&mut self, platform: &dyn PlatformInfo) -> Result<(), ModuleError> {
        let randomer = platform.generate_unique_id();
        let gvcf = self
            .base
            .generate_unique_file_name(platform, &format!("{randomer}.g.vcf"), None);
        let gvcf_idx = self
            .base
            .generate_unique_file_name(platform, &format!("{randomer}.g.vcf.idx"), None);
        self.base.add_output("gvcf", gvcf)?;
        self.base.add_output("gvcf_idx", gvcf_idx)
    }

    fn define_command(&self, _platform: &dyn PlatformInfo) -> Result<Option<String>, ModuleError> {
        let java = display_value(self.base.required_argument("java")?);
        let gatk = display_value(self.base.required_argument("gatk")?);
        let reference = display_value(self.base.required_argument("ref")?);
        let heap = heap_from_mem(&self.base, 9, 10)?;
        let flag = output_flag(gatk_version(&self.base)?);
        let gvcf_out = self.base.output_path("gvcf")?;

        let mut opts = vec![format!("{flag} {gvcf_out}"), format!("-R {reference}")];
        opts.extend(
            value_items(self.base.required_argument("gvcf")?)
                .into_iter()
                .map(|gvcf| format!("-V {gvcf}")),
        );

        Ok(Some(format!(
            "{java} -Xmx{heap}G -Djava.io.tmpdir={JVM_TMP_DIR} -cp {gatk} \
             org.broadinstitute.gatk.tools.CatVariants {} !LOG3!",
            opts.join(" ")
        )))
    }
}

/// Gathers per-split base recalibration reports into one table.
#[derive(Debug)]
pub struct MergeBqsrs {
    base: ModuleBase,
}

impl MergeBqsrs {
    pub fn new(id: &str) -> Self {
        Self {
            base: merger_base(
                id,
                "merge_bqsrs",
                "MergeBQSRs",
                &["BQSR_report"],
                &["BQSR_report"],
            ),
        }
    }
}

impl ModuleDef for MergeBqsrs {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    fn define_input(&mut self) -> Result<(), ModuleError> {
        add_gatk_tool_arguments(&mut self.base)?;
        add_reference_arguments(&mut self.base)?;
        self.base
            .add_argument(Argument::new("BQSR_report").mandatory())?;
        add_capacity(&mut self.base, 8, 16)
    }
}

impl Merger for MergeBqsrs {
    fn define_output(&mut self, platform: &dyn PlatformInfo) -> Result<(), ModuleError> {
        let merged = self
            .base
            .generate_unique_file_name(platform, ".merged.grp", None);
        self.base.add_output("BQSR_report", merged)
    }

    fn define_command(&self, _platform: &dyn PlatformInfo) -> Result<Option<String>, ModuleError> {
        let version = gatk_version(&self.base)?;
        let gatk_cmd = gatk_command(&self.base, version)?;
        let reports = value_items(self.base.required_argument("BQSR_report")?);
        let merged = self.base.output_path("BQSR_report")?;

        Ok(Some(format!(
            "{gatk_cmd} GatherBQSRReports --input {} {} {merged} !LOG3!",
            reports.join(" --input "),
            output_flag(version)
        )))
    }
}

/// Imports gVCFs from many samples into a GenomicsDB workspace.
///
/// Consumes many inputs without closing the split of its interval.
#[derive(Debug)]
pub struct GenomicsDbImport {
    base: ModuleBase,
}

impl GenomicsDbImport {
    pub fn new(id: &str) -> Self {
        Self {
            base: ModuleBase::new(id, "genomicsdb_import", "GenomicsDBImport")
                .with_input_keys(&["gvcf", "gvcf_idx"])
                .with_output_keys(&["genomicsDB"])
                .with_req_tools(&["java", "gatk"])
                .with_req_resources(&[]),
        }
    }
}

impl ModuleDef for GenomicsDbImport {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    fn define_input(&mut self) -> Result<(), ModuleError> {
        self.base
            .add_argument(Argument::new("java").mandatory().resource())?;
        self.base
            .add_argument(Argument::new("gatk").mandatory().resource())?;
        self.base.add_argument(Argument::new("gvcf").mandatory())?;
        self.base.add_argument(Argument::new("gvcf_idx").mandatory())?;
        self.base
            .add_argument(Argument::new("batch_size").mandatory().default_value(50))?;
        self.base
            .add_argument(Argument::new("interval_pad").default_value(Value::Null))?;
        add_capacity(&mut self.base, 5, 15)?;
        self.base.add_argument(Argument::new("location"))?;
        self.base.add_argument(Argument::new("excluded_location"))
    }
}

impl Merger for GenomicsDbImport {
    fn define_output(&mut self, platform: &dyn PlatformInfo) -> Result<(), ModuleError> {
        let workspace = self
            .base
            .generate_unique_file_name(platform, "genomicsDB", None);
        self.base.add_output("genomicsDB", workspace)
    }

    fn define_command(&self, _platform: &dyn PlatformInfo) -> Result<Option<String>, ModuleError> {
        let java = display_value(self.base.required_argument("java")?);
        let gatk = display_value(self.base.required_argument("gatk")?);
        let heap = heap_from_mem(&self.base, 3, 5)?;
        let nr_cpus = self.base.argument_u64("nr_cpus")?;
        let batch_size = self.base.argument_u64("batch_size")?;
        let workspace = self.base.output_path("genomicsDB")?;

        let mut opts: Vec<String> = value_items(self.base.required_argument("gvcf")?)
            .into_iter()
            .map(|gvcf| format!("-V {gvcf}"))
            .collect();
        opts.push(format!("--reader-threads {nr_cpus}"));
        opts.push(format!("--batch-size {batch_size}"));
        opts.push(format!("--genomicsdb-workspace-path {workspace}"));
        if let Some(pad) = self.base.argument("interval_pad").filter(|v| !v.is_null()) {
            opts.push(format!("-ip {}", display_value(pad)));
        }
        opts.extend(location_options(&self.base, false));

        Ok(Some(format!(
            "rm -rf {workspace} ; {java} -Xmx{heap}G -Xms{heap}G -Djava.io.tmpdir={JVM_TMP_DIR} \
             -jar {gatk} GenomicsDBImport {} !LOG3!",
            opts.join(" ")
        )))
    }
}
