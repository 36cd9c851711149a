//! One pipeline step bound to a platform and a job name.
//!
//! A [`Worker`] runs a strictly ordered protocol and never retries:
//!
//! 1. resolve every declared argument against the scoped inputs, stopping at
//!    the first mandatory argument that cannot be set
//! 2. read the resolved `nr_cpus` and `mem`
//! 3. generate the module's command
//! 4. submit the command, unless there is nothing to run
//!
//! Any failure before step 4 aborts the run without submitting anything.
//! Submission does not wait for the job; the returned [`JobHandle`] does.
//!
//! [`Worker::spawn`] runs the protocol on its own thread and hands back a
//! [`WorkerHandle`] whose `join` yields the terminal result.

use std::io;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, instrument, warn};

use crate::core::error::ModuleError;
use crate::core::output::OutputSet;
use crate::core::platform::PlatformInfo;
use crate::core::resolver::{Resolution, resolve_arguments};
use crate::core::scope::ScopedInputs;
use crate::core::step_module::{ModuleKind, StepModule};
use crate::io::platform::{JobHandle, JobRequest, Platform, PlatformError};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker for job '{job_name}' failed: {source}")]
    Module {
        job_name: String,
        #[source]
        source: ModuleError,
    },

    #[error("worker for job '{job_name}' could not submit: {source}")]
    Submission {
        job_name: String,
        #[source]
        source: PlatformError,
    },

    #[error("worker for job '{job_name}' could not start: {source}")]
    Spawn {
        job_name: String,
        #[source]
        source: io::Error,
    },

    #[error("worker for job '{job_name}' has stopped working")]
    Panicked { job_name: String },
}

impl WorkerError {
    pub fn job_name(&self) -> &str {
        match self {
            Self::Module { job_name, .. }
            | Self::Submission { job_name, .. }
            | Self::Spawn { job_name, .. }
            | Self::Panicked { job_name } => job_name,
        }
    }

    pub fn module_error(&self) -> Option<&ModuleError> {
        match self {
            Self::Module { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result of a run that reached the submission step.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub job_name: String,
    pub module_id: String,
    pub kind: ModuleKind,
    pub resolutions: Vec<Resolution>,
    pub nr_cpus: u64,
    pub mem: u64,
    /// `None` when the module had nothing to run.
    pub command: Option<String>,
    pub output: OutputSet,
    /// Pending job; `None` exactly when `command` is `None`.
    pub job: Option<JobHandle>,
}

impl WorkerOutcome {
    pub fn nr_splits(&self) -> usize {
        self.output.len()
    }
}

pub struct Worker<P> {
    platform: Arc<P>,
    module: StepModule,
    job_name: String,
    inputs: ScopedInputs,
}

impl<P: Platform + 'static> Worker<P> {
    pub fn new(platform: Arc<P>, module: StepModule, job_name: impl Into<String>) -> Self {
        Self {
            platform,
            module,
            job_name: job_name.into(),
            inputs: ScopedInputs::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: ScopedInputs) -> Self {
        self.inputs = inputs;
        self
    }

    /// Run the protocol on the current thread.
    #[instrument(skip_all, fields(job = %self.job_name, module = %self.module.id()))]
    pub fn run(mut self) -> Result<WorkerOutcome, WorkerError> {
        let module_id = self.module.id().to_string();
        let platform: &P = &self.platform;

        let resolutions = resolve_arguments(
            &module_id,
            self.module.arguments_mut(),
            &self.inputs,
            platform as &dyn PlatformInfo,
        )
        .map_err(|source| module_failure(&self.job_name, source))?;

        let missing = self.module.check_input(&self.inputs.provided_keys());
        if !missing.is_empty() {
            debug!(?missing, "declared input keys not provided by any scope");
        }

        let base = self.module.base();
        let nr_cpus = base
            .argument_u64("nr_cpus")
            .map_err(|source| module_failure(&self.job_name, source))?;
        let mem = base
            .argument_u64("mem")
            .map_err(|source| module_failure(&self.job_name, source))?;

        let command = self
            .module
            .generate_command(platform)
            .map_err(|source| module_failure(&self.job_name, source))?;

        let job = match &command {
            Some(command) => {
                let request = JobRequest {
                    job_name: self.job_name.clone(),
                    command: command.clone(),
                    nr_cpus,
                    mem,
                };
                let handle = platform.run_command(request).map_err(|source| {
                    warn!(err = %source, "platform rejected job");
                    WorkerError::Submission {
                        job_name: self.job_name.clone(),
                        source,
                    }
                })?;
                info!(nr_cpus, mem, nr_splits = self.module.nr_splits(), "job submitted");
                Some(handle)
            }
            None => {
                info!("nothing to run");
                None
            }
        };

        Ok(WorkerOutcome {
            job_name: self.job_name,
            module_id,
            kind: self.module.kind(),
            resolutions,
            nr_cpus,
            mem,
            command,
            output: self.module.output().clone(),
            job,
        })
    }

    /// Run the protocol on a dedicated thread.
    pub fn spawn(self) -> Result<WorkerHandle, WorkerError> {
        let job_name = self.job_name.clone();
        let thread = thread::Builder::new()
            .name(format!("worker-{job_name}"))
            .spawn(move || self.run())
            .map_err(|source| WorkerError::Spawn {
                job_name: job_name.clone(),
                source,
            })?;
        Ok(WorkerHandle { job_name, thread })
    }
}

fn module_failure(job_name: &str, source: ModuleError) -> WorkerError {
    warn!(err = %source, "module failed");
    WorkerError::Module {
        job_name: job_name.to_string(),
        source,
    }
}

/// Terminal result of a spawned worker.
#[derive(Debug)]
pub struct WorkerHandle {
    job_name: String,
    thread: thread::JoinHandle<Result<WorkerOutcome, WorkerError>>,
}

impl WorkerHandle {
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Wait for the worker; a panic surfaces as [`WorkerError::Panicked`].
    pub fn join(self) -> Result<WorkerOutcome, WorkerError> {
        let job_name = self.job_name;
        self.thread
            .join()
            .unwrap_or_else(|_| Err(WorkerError::Panicked { job_name }))
    }
}

/// Join every handle, in order, without stopping at the first failure.
pub fn join_all(
    handles: impl IntoIterator<Item = WorkerHandle>,
) -> Vec<Result<WorkerOutcome, WorkerError>> {
    handles.into_iter().map(WorkerHandle::join).collect()
}
