//! Step setup: files first, then cluster actions concurrently with the setup commands.

use std::{
    io,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chiron_cluster::{ClusterApi, ClusterError};
use chiron_types::{SetupAction, Step};
use futures_util::future::{BoxFuture, FutureExt, try_join_all};
use thiserror::Error;
use tracing::{debug, info};

use super::{CommandError, FileSink, ShellExecutor};
use crate::{
    condition::{ConditionError, ConditionEvaluator},
    config::EngineConfig,
};

/// A setup action that failed; the step it belongs to is not shown.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("'{0}' is not a plain file name")]
    InvalidPath(String),
    #[error("asset '{name}' is not valid base64: {source}")]
    InvalidAsset {
        name: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("failed to apply '{name}': {source}")]
    Apply {
        name: String,
        #[source]
        source: ClusterError,
    },
    #[error(transparent)]
    Condition(#[from] ConditionError),
    #[error("setup command '{command}' failed: {source}")]
    Command {
        command: String,
        #[source]
        source: CommandError,
    },
    #[error("step declares a setup action with an unsupported method")]
    UnsupportedAction,
}

/// Executes the setup actions of a step.
#[derive(Clone)]
pub struct SetupRunner {
    config: EngineConfig,
    sink: Arc<dyn FileSink>,
    shell: Arc<dyn ShellExecutor>,
    cluster: Arc<dyn ClusterApi>,
    conditions: ConditionEvaluator,
}

impl SetupRunner {
    pub fn new(
        config: EngineConfig,
        sink: Arc<dyn FileSink>,
        shell: Arc<dyn ShellExecutor>,
        cluster: Arc<dyn ClusterApi>,
        conditions: ConditionEvaluator,
    ) -> Self {
        Self {
            config,
            sink,
            shell,
            cluster,
            conditions,
        }
    }

    /// Runs every setup action of `step` and returns once all of them have settled.
    ///
    /// Assets and manifest files are written in declaration order before anything else
    /// starts, so EXECCOMMAND actions can rely on them. Each APPLY and WAIT then runs
    /// concurrently alongside a single chain that executes the EXECCOMMAND actions one after
    /// another in declaration order; the first failure is returned.
    pub async fn prepare(&self, step: &Step) -> Result<(), SetupError> {
        if step.pre_commands.iter().any(|action| matches!(action, SetupAction::Unsupported)) {
            return Err(SetupError::UnsupportedAction);
        }

        for asset in &step.assets {
            let bytes = STANDARD.decode(asset.value.trim()).map_err(|source| SetupError::InvalidAsset {
                name: asset.name.clone(),
                source,
            })?;
            self.write(&self.config.asset_dir, &asset.name, &bytes).await?;
        }

        let mut commands = Vec::new();
        for action in &step.pre_commands {
            match action {
                SetupAction::Apply { content } => {
                    self.write(&self.config.workspace_dir, &content.name, content.value.as_bytes())
                        .await?;
                }
                SetupAction::IncludeFile { content } => {
                    self.write(&self.config.include_dir, &content.name, content.value.as_bytes())
                        .await?;
                }
                SetupAction::ExecCommand { value } => commands.push(value.as_str()),
                SetupAction::Wait(_) | SetupAction::Unsupported => {}
            }
        }

        let mut pending: Vec<BoxFuture<'_, Result<(), SetupError>>> = step
            .pre_commands
            .iter()
            .filter_map(|action| self.start(action))
            .collect();
        if !commands.is_empty() {
            pending.push(self.run_commands(commands).boxed());
        }
        let started = pending.len();
        try_join_all(pending).await?;
        info!(actions = step.pre_commands.len(), concurrent = started, "step setup finished");
        Ok(())
    }

    fn start<'a>(&'a self, action: &'a SetupAction) -> Option<BoxFuture<'a, Result<(), SetupError>>> {
        match action {
            SetupAction::Apply { content } => Some(
                async move {
                    self.cluster
                        .apply(&content.value, &self.config.namespace)
                        .await
                        .map_err(|source| SetupError::Apply {
                            name: content.name.clone(),
                            source,
                        })?;
                    debug!(name = %content.name, namespace = %self.config.namespace, "manifest applied");
                    Ok(())
                }
                .boxed(),
            ),
            SetupAction::Wait(condition) => Some(
                async move {
                    self.conditions.block_until_satisfied(condition).await?;
                    Ok(())
                }
                .boxed(),
            ),
            SetupAction::ExecCommand { .. } | SetupAction::IncludeFile { .. } | SetupAction::Unsupported => None,
        }
    }

    async fn run_commands(&self, commands: Vec<&str>) -> Result<(), SetupError> {
        for command in commands {
            let output = self
                .shell
                .run(command, Some(&self.config.workspace_dir))
                .await
                .map_err(|source| SetupError::Command {
                    command: command.to_string(),
                    source,
                })?;
            debug!(%command, stdout = %output.stdout.trim_end(), "setup command finished");
        }
        Ok(())
    }

    async fn write(&self, directory: &Path, name: &str, bytes: &[u8]) -> Result<(), SetupError> {
        let path = directory.join(plain_file_name(name)?);
        self.sink
            .write(&path, bytes)
            .await
            .map_err(|source| SetupError::Io { path: path.clone(), source })?;
        debug!(path = %path.display(), bytes = bytes.len(), "setup file written");
        Ok(())
    }
}

/// Accepts only a single normal path component.
fn plain_file_name(name: &str) -> Result<&Path, SetupError> {
    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(path),
        _ => Err(SetupError::InvalidPath(name.to_string())),
    }
}
