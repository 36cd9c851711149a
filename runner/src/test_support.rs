//! Test-only helpers for building platforms, scopes and modules.

use serde_json::Value;

use crate::core::scope::{Scope, ScopedInputs};
use crate::io::config::PlatformConfig;
use crate::io::platform::DryRunPlatform;

pub const TEST_PIPELINE: &str = "demo";
pub const TEST_OUTPUT_DIR: &str = "/out";
pub const TEST_MAX_CPUS: u64 = 16;
pub const TEST_MAX_MEM: u64 = 64;

/// Platform config with deterministic naming and capacity.
pub fn test_config() -> PlatformConfig {
    PlatformConfig {
        pipeline_name: TEST_PIPELINE.to_string(),
        output_dir: TEST_OUTPUT_DIR.into(),
        log_dir: format!("{TEST_OUTPUT_DIR}/logs").into(),
        max_cpus: TEST_MAX_CPUS,
        max_mem: TEST_MAX_MEM,
        ..PlatformConfig::default()
    }
}

/// Dry-run platform writing nowhere, with pipeline `demo` and output `/out`.
pub fn test_platform() -> DryRunPlatform {
    DryRunPlatform::new(test_config())
}

/// Inputs with one scope populated from `(key, value)` pairs.
pub fn scoped(scope: Scope, pairs: &[(&str, Value)]) -> ScopedInputs {
    let mut inputs = ScopedInputs::new();
    for (key, value) in pairs {
        inputs.insert(scope, *key, value.clone());
    }
    inputs
}
