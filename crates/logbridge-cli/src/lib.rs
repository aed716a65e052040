//! logbridge runner library.
//!
//! Starts processes, attaches the log bridge to their output and supervises
//! them until they exit or the runner is interrupted.

pub mod cli;
pub mod commands;
pub mod error;
pub mod manifest;
pub mod runner;

pub use error::{Result, RunnerError};
pub use manifest::ProcessSpec;
pub use runner::{ProcessRunner, RunnerOptions};
