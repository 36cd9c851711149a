//! Pipeline step execution core.
//!
//! A pipeline step is a module (tool, splitter, merger or pseudo-merger)
//! whose arguments are resolved from scoped inputs, whose outputs are named
//! and validated up front, and whose command is submitted to a platform by a
//! [`worker::Worker`]. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (arguments, resolution, output
//!   naming, module contracts). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (configuration files, child
//!   processes, job submission).
//!
//! [`worker`] coordinates the two for one step; [`modules`] holds the
//! built-in step library.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod modules;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod worker;
