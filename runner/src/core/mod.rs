//! Deterministic, pure logic shared by the runner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! module definitions and scoped inputs and return deterministic outputs
//! suitable for tests. Platform capacities and naming come in through
//! [`platform::PlatformInfo`].

pub mod argument;
pub mod error;
pub mod merger;
pub mod module;
pub mod output;
pub mod platform;
pub mod resolver;
pub mod scope;
pub mod splitter;
pub mod step_module;
