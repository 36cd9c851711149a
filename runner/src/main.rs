//! Pipeline step runner.
//!
//! Builds one module from the built-in library, resolves its arguments from
//! the scopes given on the command line, generates its command and submits
//! it to the local platform (or only records it with `--dry-run`). The
//! outcome is printed to stdout as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use gap_runner::core::argument::display_value;
use gap_runner::core::output::OutputSet;
use gap_runner::core::scope::{ResourceRef, Scope, ScopedInputs};
use gap_runner::core::step_module::StepModule;
use gap_runner::exit_codes;
use gap_runner::io::config::load_config;
use gap_runner::io::platform::{DryRunPlatform, JobReport, LocalPlatform, Platform};
use gap_runner::logging;
use gap_runner::modules::{self, BuildError, KINDS};
use gap_runner::worker::Worker;

#[derive(Parser)]
#[command(
    name = "gap-runner",
    version,
    about = "Resolve, generate and submit one pipeline step"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List built-in module kinds and the arguments they declare.
    Modules,
    /// Run one step through a worker and print the outcome as JSON.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Module kind (see `gap-runner modules`).
    #[arg(long)]
    kind: String,

    /// Module instance id.
    #[arg(long)]
    id: String,

    /// Job name; defaults to the module id.
    #[arg(long)]
    job: Option<String>,

    /// Platform config (TOML). Defaults apply when the file is missing.
    #[arg(long, default_value = "gap.toml")]
    config: PathBuf,

    /// Tool a splitter or merger serves, used in split file names.
    #[arg(long)]
    main_module: Option<String>,

    /// Module-scope value (highest precedence).
    #[arg(long = "module", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    module_values: Vec<(String, Value)>,

    /// Node-scope value.
    #[arg(long = "node", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    node_values: Vec<(String, Value)>,

    /// Sample-scope value.
    #[arg(long = "sample", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    sample_values: Vec<(String, Value)>,

    /// Config-scope value (lowest precedence; names resources).
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    config_values: Vec<(String, Value)>,

    /// Resource catalog entry.
    #[arg(long = "resource", value_name = "KEY=NAME=PATH", value_parser = parse_resource)]
    resources: Vec<(String, ResourceRef)>,

    /// Record the job instead of running it.
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    fn scoped_inputs(&self) -> ScopedInputs {
        let mut inputs = ScopedInputs::new();
        let scopes = [
            (Scope::Module, &self.module_values),
            (Scope::Node, &self.node_values),
            (Scope::Sample, &self.sample_values),
            (Scope::Config, &self.config_values),
        ];
        for (scope, values) in scopes {
            for (key, value) in values {
                inputs.insert(scope, key.clone(), value.clone());
            }
        }
        for (key, resource) in &self.resources {
            inputs.insert_resource(key.clone(), resource.clone());
        }
        inputs
    }
}

/// `KEY=VALUE`, where VALUE is JSON when it parses as JSON and a plain
/// string otherwise.
fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_resource(raw: &str) -> Result<(String, ResourceRef), String> {
    let mut parts = raw.splitn(3, '=');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(key), Some(name), Some(path))
            if !key.is_empty() && !name.is_empty() && !path.is_empty() =>
        {
            Ok((key.to_string(), ResourceRef::new(name, path)))
        }
        _ => Err(format!("expected KEY=NAME=PATH, got '{raw}'")),
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Modules => cmd_modules(),
        Command::Run(args) => cmd_run(&args),
    }
}

fn cmd_modules() -> Result<i32> {
    for kind in KINDS {
        let module = modules::build(kind, kind).with_context(|| format!("build {kind}"))?;
        println!("{kind} ({})", module.kind());
        for argument in module.arguments().iter() {
            let mut flags = Vec::new();
            if argument.is_mandatory() {
                flags.push("mandatory".to_string());
            }
            if argument.is_resource() {
                flags.push("resource".to_string());
            }
            if let Some(default) = argument.default() {
                flags.push(format!("default={}", display_value(default)));
            }
            println!("  {} {}", argument.name(), flags.join(" "));
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let config = load_config(&args.config)?;
    let mut module = match modules::build(&args.kind, &args.id) {
        Ok(module) => module,
        Err(BuildError::Module(err)) => {
            eprintln!("{err}");
            return Ok(exit_codes::MODULE_FAILED);
        }
        Err(err @ BuildError::UnknownKind { .. }) => return Err(err.into()),
    };
    if let Some(main_module) = &args.main_module {
        module.set_main_module_name(main_module.clone());
    }
    let job_name = args.job.clone().unwrap_or_else(|| args.id.clone());
    let inputs = args.scoped_inputs();

    if args.dry_run {
        execute(Arc::new(DryRunPlatform::new(config)), module, job_name, inputs)
    } else {
        execute(Arc::new(LocalPlatform::new(config)), module, job_name, inputs)
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    job_name: &'a str,
    module_id: &'a str,
    kind: String,
    nr_cpus: u64,
    mem: u64,
    command: Option<&'a str>,
    resolved: IndexMap<&'a str, String>,
    nr_splits: usize,
    output: &'a OutputSet,
    job: Option<JobReport>,
}

fn execute<P: Platform + 'static>(
    platform: Arc<P>,
    module: StepModule,
    job_name: String,
    inputs: ScopedInputs,
) -> Result<i32> {
    let mut outcome = match Worker::new(platform, module, job_name).with_inputs(inputs).run() {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("{err}");
            let code = if err.module_error().is_some() {
                exit_codes::MODULE_FAILED
            } else {
                exit_codes::JOB_FAILED
            };
            return Ok(code);
        }
    };

    let mut code = exit_codes::OK;
    let job = match outcome.job.take().map(|handle| handle.wait()) {
        Some(Ok(report)) => {
            if !report.success {
                code = exit_codes::JOB_FAILED;
            }
            Some(report)
        }
        Some(Err(err)) => {
            eprintln!("{err}");
            code = exit_codes::JOB_FAILED;
            None
        }
        None => None,
    };

    let report = RunReport {
        job_name: &outcome.job_name,
        module_id: &outcome.module_id,
        kind: outcome.kind.to_string(),
        nr_cpus: outcome.nr_cpus,
        mem: outcome.mem,
        command: outcome.command.as_deref(),
        resolved: outcome
            .resolutions
            .iter()
            .map(|r| (r.argument.as_str(), r.from.to_string()))
            .collect(),
        nr_splits: outcome.nr_splits(),
        output: &outcome.output,
        job,
    };
    let payload = serde_json::to_string_pretty(&report).context("serialize outcome")?;
    println!("{payload}");
    Ok(code)
}
