//! Engine configuration.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Directory (under the workspace) that INCLUDEFILE actions write into.
pub const INCLUDE_DIR_NAME: &str = "include";
/// Directory (under the static root) that step assets are written into.
pub const ASSET_DIR_NAME: &str = "assets";
/// Namespace used when neither the configuration nor a condition names one.
pub const DEFAULT_NAMESPACE: &str = "default";
/// Fixed retry interval for WAIT actions and teardown waits.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Paths and cluster settings the engine works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root for APPLY manifests; also the working directory for shell commands.
    pub workspace_dir: PathBuf,
    /// Destination for INCLUDEFILE content.
    pub include_dir: PathBuf,
    /// Destination for step assets, served alongside the static site.
    pub asset_dir: PathBuf,
    /// Namespace managed by restart and assumed by conditions that omit one.
    pub namespace: String,
    pub poll_interval: Duration,
}

impl EngineConfig {
    /// Derives the include and asset directories from the workspace and static roots.
    pub fn new(workspace_dir: impl AsRef<Path>, static_dir: impl AsRef<Path>) -> Self {
        let workspace_dir = workspace_dir.as_ref().to_path_buf();
        Self {
            include_dir: workspace_dir.join(INCLUDE_DIR_NAME),
            asset_dir: static_dir.as_ref().join(ASSET_DIR_NAME),
            workspace_dir,
            namespace: DEFAULT_NAMESPACE.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
