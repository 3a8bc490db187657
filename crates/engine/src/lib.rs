//! # Chiron Engine
//!
//! The Chiron Engine drives an interactive tutorial: it sets up each step of a loaded
//! document (writing files, applying manifests, running commands, waiting for the cluster
//! to converge), shows the step's text, and advances once the operator has cleared the
//! step's post-checks.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chiron_cluster::KubeClusterApi;
//! use chiron_engine::{ContentEngine, EngineConfig, FsSink, SystemShell};
//! use chiron_types::Document;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cluster = Arc::new(KubeClusterApi::try_default().await?);
//! let mut engine = ContentEngine::new(
//!     EngineConfig::new("/srv/tutorial", "/srv/static"),
//!     cluster,
//!     Arc::new(FsSink),
//!     Arc::new(SystemShell::default()),
//! );
//!
//! engine.load(Document::from_json(r#"[{"text": "<p>Run ls</p>", "postChecks": [{"method": "COMMANDWAIT", "value": "ls"}]}]"#)?).await?;
//! let outcome = engine.execute_operator_command("ls").await?;
//! println!("advanced: {}, output: {}", outcome.advanced, outcome.output);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`poller`**: resource listings, fixed-interval polling and namespace teardown
//! - **`condition`**: resource-count conditions for WAIT and CHECK
//! - **`pattern`**: glob matching for commands and resource names
//! - **`executor`**: shell, filesystem and step setup collaborators
//! - **`content`**: the step state machine and command history

pub mod condition;
pub mod config;
pub mod content;
pub mod executor;
pub mod pattern;
pub mod poller;

#[cfg(test)]
mod test_support;

pub use condition::{ConditionError, ConditionEvaluator};
pub use config::EngineConfig;
pub use content::{
    CommandOutcome, ContentEngine, CurrentChunk, EngineError, EngineSnapshot, EngineState, FINAL_CHUNK_HTML,
};
pub use executor::{CommandError, CommandOutput, FileSink, FsSink, SetupError, SetupRunner, ShellExecutor, SystemShell};
pub use poller::{LookupError, ResourcePoller, TeardownError};
