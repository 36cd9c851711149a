//! Read-only view of the execution platform used during resolution and
//! command generation.
//!
//! Job submission lives in [`crate::io::platform::Platform`]; this trait
//! only answers questions, so core logic stays free of I/O.

use std::path::Path;

pub trait PlatformInfo: Send + Sync {
    /// Pipeline name used as the prefix of every generated file name.
    fn pipeline_name(&self) -> &str;

    /// Directory that generated output paths are placed in.
    fn output_dir(&self) -> &Path;

    /// Largest CPU count a single job may request.
    fn max_cpus(&self) -> u64;

    /// Largest memory (GB) a single job may request.
    fn max_mem(&self) -> u64;

    /// Short random token for disambiguating file names.
    fn generate_unique_id(&self) -> String;
}
