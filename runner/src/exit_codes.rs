//! Stable exit codes for `gap-runner` commands.

/// Command succeeded (including "nothing to run").
pub const OK: i32 = 0;
/// Invalid usage, configuration or unknown module kind.
pub const INVALID: i32 = 1;
/// The module failed before submission (contract, argument or output error).
pub const MODULE_FAILED: i32 = 2;
/// The platform rejected the job or the job itself failed.
pub const JOB_FAILED: i32 = 3;
