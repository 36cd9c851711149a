//! Side-effecting pieces: configuration files, child processes and job
//! submission.

pub mod config;
pub mod platform;
pub mod process;
