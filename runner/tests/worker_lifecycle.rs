//! Fan-out / fan-in lifecycle through the public worker API.
//!
//! A FASTQ splitter fans out, one worker per split runs a per-split tool
//! concurrently, and a merger consumes the gathered per-split outputs.

use std::sync::Arc;

use serde_json::json;

use gap_runner::core::argument::{Argument, display_value};
use gap_runner::core::error::ModuleError;
use gap_runner::core::merger::collect_split_outputs;
use gap_runner::core::module::{ModuleBase, ModuleDef, Tool};
use gap_runner::core::platform::PlatformInfo;
use gap_runner::core::scope::{ResourceRef, Scope, ScopedInputs};
use gap_runner::core::step_module::{ModuleKind, StepModule};
use gap_runner::io::platform::DryRunPlatform;
use gap_runner::modules;
use gap_runner::test_support::{scoped, test_platform};
use gap_runner::worker::{Worker, join_all};

/// Per-split recalibration table from one FASTQ chunk.
#[derive(Debug)]
struct RecalTable {
    base: ModuleBase,
}

impl RecalTable {
    fn new(id: &str) -> Self {
        Self {
            base: ModuleBase::new(id, "recal_table", "RecalTable")
                .with_input_keys(&["R1", "split_name"])
                .with_output_keys(&["BQSR_report"])
                .with_req_tools(&[])
                .with_req_resources(&[]),
        }
    }
}

impl ModuleDef for RecalTable {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    fn define_input(&mut self) -> Result<(), ModuleError> {
        self.base.add_argument(Argument::new("R1").mandatory())?;
        self.base.add_argument(Argument::new("split_name").mandatory())?;
        self.base
            .add_argument(Argument::new("nr_cpus").mandatory().default_value("max"))?;
        self.base
            .add_argument(Argument::new("mem").mandatory().default_value(2))
    }
}

impl Tool for RecalTable {
    fn define_output(&mut self, platform: &dyn PlatformInfo) -> Result<(), ModuleError> {
        let split_name = display_value(self.base.required_argument("split_name")?);
        let table = self
            .base
            .generate_unique_file_name(platform, "grp", Some(&split_name));
        self.base.add_output("BQSR_report", table)
    }

    fn define_command(&self, _platform: &dyn PlatformInfo) -> Result<Option<String>, ModuleError> {
        let r1 = display_value(self.base.required_argument("R1")?);
        Ok(Some(format!(
            "recal {r1} > {}",
            self.base.output_path("BQSR_report")?
        )))
    }
}

fn gatk_resources(inputs: &mut ScopedInputs) {
    for (key, path) in [
        ("java", "/usr/bin/java"),
        ("gatk", "/opt/gatk.jar"),
        ("ref", "/ref/hg38.fa"),
        ("ref_idx", "/ref/hg38.fa.fai"),
        ("ref_dict", "/ref/hg38.dict"),
    ] {
        inputs.insert_resource(key, ResourceRef::new("hg38", path));
    }
}

#[test]
fn split_process_and_merge() {
    let platform = Arc::new(test_platform());

    // Fan out.
    let mut split_module = modules::build("FastqSplitter", "split").expect("build splitter");
    split_module.set_main_module_name("RecalTable");
    let split_inputs = scoped(
        Scope::Sample,
        &[
            ("R1", json!("/data/s_R1.fastq")),
            ("total_reads", json!(11)),
            ("nr_reads", json!(5)),
        ],
    );
    let split = Worker::new(Arc::clone(&platform), split_module, "split_job")
        .with_inputs(split_inputs)
        .run()
        .expect("split");
    assert_eq!(split.kind, ModuleKind::Splitter);
    assert_eq!(split.nr_splits(), 3);

    // One concurrent worker per split.
    let handles: Vec<_> = split
        .output
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let r1 = entry.get("R1").expect("R1 for every split");
            let inputs = scoped(
                Scope::Module,
                &[
                    ("R1", json!(r1.display().to_string())),
                    ("split_name", json!(format!("part{index}"))),
                ],
            );
            let module = StepModule::tool(RecalTable::new("recal")).expect("init tool");
            Worker::new(Arc::clone(&platform), module, format!("recal_{index}"))
                .with_inputs(inputs)
                .spawn()
                .expect("spawn")
        })
        .collect();

    let outcomes: Vec<_> = join_all(handles)
        .into_iter()
        .map(|result| result.expect("per-split worker"))
        .collect();
    assert!(outcomes.iter().all(|o| o.nr_cpus == platform.max_cpus()));

    // Fan in.
    let gathered = collect_split_outputs(outcomes.iter().filter_map(|o| o.output.get(0)));
    assert_eq!(
        gathered.get("BQSR_report"),
        Some(&json!([
            "/out/demo_recal.part0.grp",
            "/out/demo_recal.part1.grp",
            "/out/demo_recal.part2.grp"
        ]))
    );

    let mut merge_inputs = ScopedInputs::new().with_scope(Scope::Module, gathered);
    merge_inputs.insert(Scope::Config, "gatk_version", "4.2");
    gatk_resources(&mut merge_inputs);
    let merge_module = modules::build("MergeBQSRs", "bqsr_merge").expect("build merger");
    let merged = Worker::new(Arc::clone(&platform), merge_module, "merge_job")
        .with_inputs(merge_inputs)
        .run()
        .expect("merge");

    let command = merged.command.expect("merge command");
    assert!(command.contains(
        "--input /out/demo_recal.part0.grp --input /out/demo_recal.part1.grp \
         --input /out/demo_recal.part2.grp -O /out/demo_bqsr_merge.merged.grp"
    ));

    // 1 split job + 3 per-split jobs + 1 merge job, each submitted once.
    let mut jobs: Vec<String> = platform
        .submitted()
        .into_iter()
        .map(|request| request.job_name)
        .collect();
    jobs.sort();
    assert_eq!(
        jobs,
        vec!["merge_job", "recal_0", "recal_1", "recal_2", "split_job"]
    );
}

#[test]
fn failing_sibling_does_not_affect_others() {
    let platform = Arc::new(DryRunPlatform::new(gap_runner::test_support::test_config()));

    let good = StepModule::tool(RecalTable::new("good")).expect("init");
    let bad = StepModule::tool(RecalTable::new("bad")).expect("init");
    let good_inputs = scoped(
        Scope::Node,
        &[("R1", json!("/data/a.fastq")), ("split_name", json!("a"))],
    );

    let results = join_all([
        Worker::new(Arc::clone(&platform), good, "good_job")
            .with_inputs(good_inputs)
            .spawn()
            .expect("spawn good"),
        Worker::new(Arc::clone(&platform), bad, "bad_job")
            .spawn()
            .expect("spawn bad"),
    ]);

    assert!(results[0].is_ok());
    let err = results[1].as_ref().expect_err("bad worker fails");
    assert_eq!(err.job_name(), "bad_job");
    assert!(matches!(
        err.module_error(),
        Some(ModuleError::UnresolvedArgument { argument, .. }) if argument == "R1"
    ));
    assert_eq!(platform.submitted().len(), 1);
}

#[test]
fn merger_without_split_inputs_fails_before_submission() {
    let platform = Arc::new(test_platform());
    let mut inputs = ScopedInputs::new();
    inputs.insert(Scope::Config, "gatk_version", "4.2");
    gatk_resources(&mut inputs);

    let module = modules::build("CatVariants", "cat").expect("build");
    let err = Worker::new(Arc::clone(&platform), module, "cat_job")
        .with_inputs(inputs)
        .run()
        .expect_err("gvcf is mandatory");
    assert!(matches!(
        err.module_error(),
        Some(ModuleError::UnresolvedArgument { argument, .. }) if argument == "gvcf"
    ));
    assert!(platform.submitted().is_empty());
}
