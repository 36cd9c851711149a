//! Platform abstraction for job submission.
//!
//! The [`Platform`] trait decouples Workers from the backend that actually
//! runs commands. Submission never blocks on the job: it returns a
//! [`JobHandle`] that yields the [`JobReport`] once the platform is done.
//! [`LocalPlatform`] runs jobs as child processes; [`DryRunPlatform`] only
//! records what would have run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::platform::PlatformInfo;
use crate::io::config::PlatformConfig;
use crate::io::process::{CommandOutput, run_shell_command};

/// One command submitted for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRequest {
    pub job_name: String,
    pub command: String,
    pub nr_cpus: u64,
    /// Memory in GB.
    pub mem: u64,
}

/// Final state of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job_name: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("job '{job_name}' requests {requested} {resource}, platform allows {available}")]
    ExceedsCapacity {
        job_name: String,
        resource: &'static str,
        requested: u64,
        available: u64,
    },

    #[error("job '{job_name}': {context}: {source}")]
    Io {
        job_name: String,
        context: String,
        source: std::io::Error,
    },

    #[error("job '{job_name}' could not be executed: {message}")]
    Execution { job_name: String, message: String },

    #[error("job '{job_name}' stopped reporting before completion")]
    Disconnected { job_name: String },
}

/// Pending completion of one submitted job.
#[derive(Debug)]
pub struct JobHandle {
    job_name: String,
    receiver: mpsc::Receiver<Result<JobReport, PlatformError>>,
}

impl JobHandle {
    /// Handle whose outcome is already known.
    pub fn completed(report: JobReport) -> Self {
        let (sender, receiver) = mpsc::channel();
        let job_name = report.job_name.clone();
        // The receiver is alive, so this cannot fail.
        let _ = sender.send(Ok(report));
        Self { job_name, receiver }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Block until the platform reports the job's outcome.
    pub fn wait(self) -> Result<JobReport, PlatformError> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(PlatformError::Disconnected {
                job_name: self.job_name.clone(),
            }))
    }
}

/// Execution backend accepting asynchronous job submissions.
pub trait Platform: PlatformInfo {
    /// Submit `request` and return without waiting for it to finish.
    fn run_command(&self, request: JobRequest) -> Result<JobHandle, PlatformError>;
}

/// Reject requests beyond what a single job may use.
pub fn check_capacity(
    platform: &dyn PlatformInfo,
    request: &JobRequest,
) -> Result<(), PlatformError> {
    let limits = [
        ("cpus", request.nr_cpus, platform.max_cpus()),
        ("GB of memory", request.mem, platform.max_mem()),
    ];
    for (resource, requested, available) in limits {
        if requested > available {
            warn!(job = %request.job_name, resource, requested, available, "job exceeds capacity");
            return Err(PlatformError::ExceedsCapacity {
                job_name: request.job_name.clone(),
                resource,
                requested,
                available,
            });
        }
    }
    Ok(())
}

/// Replace log-redirection tokens with redirections into `log_path`.
///
/// `!LOG1!` appends stdout, `!LOG2!` appends stderr, `!LOG3!` appends both.
pub fn expand_log_tokens(command: &str, log_path: &Path) -> String {
    let log = log_path.display();
    command
        .replace("!LOG1!", &format!(">> {log}"))
        .replace("!LOG2!", &format!("2>> {log}"))
        .replace("!LOG3!", &format!(">> {log} 2>&1"))
}

/// Runs each job as `sh -c` on its own thread.
#[derive(Debug, Clone)]
pub struct LocalPlatform {
    config: PlatformConfig,
}

impl LocalPlatform {
    pub fn new(config: PlatformConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

impl PlatformInfo for LocalPlatform {
    fn pipeline_name(&self) -> &str {
        &self.config.pipeline_name
    }

    fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    fn max_cpus(&self) -> u64 {
        self.config.max_cpus
    }

    fn max_mem(&self) -> u64 {
        self.config.max_mem
    }

    fn generate_unique_id(&self) -> String {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        id
    }
}

impl Platform for LocalPlatform {
    #[instrument(skip_all, fields(job = %request.job_name, nr_cpus = request.nr_cpus, mem = request.mem))]
    fn run_command(&self, request: JobRequest) -> Result<JobHandle, PlatformError> {
        check_capacity(self, &request)?;

        let job_name = request.job_name.clone();
        for dir in [&self.config.output_dir, &self.config.log_dir] {
            fs::create_dir_all(dir).map_err(|source| PlatformError::Io {
                job_name: job_name.clone(),
                context: format!("create directory {}", dir.display()),
                source,
            })?;
        }

        let log_path = self.config.log_dir.join(format!("{job_name}.log"));
        let capture_path = self.config.log_dir.join(format!("{job_name}.out"));
        let command = expand_log_tokens(&request.command, &log_path);
        let timeout = Duration::from_secs(self.config.job_timeout_secs);
        let output_limit = self.config.output_limit_bytes;

        let (sender, receiver) = mpsc::channel();
        let thread_job = job_name.clone();
        thread::Builder::new()
            .name(format!("job-{job_name}"))
            .spawn(move || {
                let result = run_job(
                    &thread_job,
                    &command,
                    timeout,
                    output_limit,
                    &log_path,
                    &capture_path,
                );
                if sender.send(result).is_err() {
                    debug!(job = %thread_job, "job handle dropped before completion");
                }
            })
            .map_err(|source| PlatformError::Io {
                job_name: job_name.clone(),
                context: "spawn job thread".to_string(),
                source,
            })?;

        info!("job submitted");
        Ok(JobHandle { job_name, receiver })
    }
}

fn run_job(
    job_name: &str,
    command: &str,
    timeout: Duration,
    output_limit: usize,
    log_path: &Path,
    capture_path: &Path,
) -> Result<JobReport, PlatformError> {
    let output = run_shell_command(command, timeout, output_limit).map_err(|err| {
        PlatformError::Execution {
            job_name: job_name.to_string(),
            message: format!("{err:#}"),
        }
    })?;

    write_capture(capture_path, &output).map_err(|source| PlatformError::Io {
        job_name: job_name.to_string(),
        context: format!("write {}", capture_path.display()),
        source,
    })?;

    let success = output.status.success() && !output.timed_out;
    if success {
        info!(job = job_name, "job finished");
    } else {
        warn!(job = job_name, exit_code = ?output.status.code(), timed_out = output.timed_out, "job failed");
    }
    Ok(JobReport {
        job_name: job_name.to_string(),
        exit_code: output.status.code(),
        success,
        timed_out: output.timed_out,
        log_path: Some(log_path.to_path_buf()),
    })
}

fn write_capture(path: &Path, output: &CommandOutput) -> std::io::Result<()> {
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str(&output.stdout_truncated_notice("job"));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.stderr_truncated_notice("job"));
    if output.timed_out {
        buf.push_str("\n[job timed out]\n");
    }
    fs::write(path, buf)
}

/// Records submissions without running anything; every job succeeds.
#[derive(Debug)]
pub struct DryRunPlatform {
    config: PlatformConfig,
    submitted: Mutex<Vec<JobRequest>>,
    next_id: AtomicU64,
}

impl DryRunPlatform {
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            config,
            submitted: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Requests accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<JobRequest> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PlatformInfo for DryRunPlatform {
    fn pipeline_name(&self) -> &str {
        &self.config.pipeline_name
    }

    fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    fn max_cpus(&self) -> u64 {
        self.config.max_cpus
    }

    fn max_mem(&self) -> u64 {
        self.config.max_mem
    }

    fn generate_unique_id(&self) -> String {
        format!("{:08x}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Platform for DryRunPlatform {
    fn run_command(&self, request: JobRequest) -> Result<JobHandle, PlatformError> {
        check_capacity(self, &request)?;
        debug!(job = %request.job_name, "dry run: recording job");
        let report = JobReport {
            job_name: request.job_name.clone(),
            exit_code: Some(0),
            success: true,
            timed_out: false,
            log_path: None,
        };
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Ok(JobHandle::completed(report))
    }
}
