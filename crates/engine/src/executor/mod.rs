//! Side-effecting collaborators used while a step is set up and while the operator runs
//! commands.
//!
//! - `runner::ShellExecutor` abstracts how a shell command is executed
//! - `sink::FileSink` abstracts where manifests, include files and assets are written
//! - `setup::SetupRunner` drives a step's setup actions through both, plus the cluster

pub mod runner;
pub mod setup;
pub mod sink;

pub use runner::{CommandError, CommandOutput, ShellExecutor, SystemShell};
pub use setup::{SetupError, SetupRunner};
pub use sink::{FileSink, FsSink};
