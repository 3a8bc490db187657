//! Filesystem sink for manifests, include files and assets.

use std::{io, path::Path};

use async_trait::async_trait;

/// Destination for files written during step setup.
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Writes `bytes` to `path`, replacing any existing file.
    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// Writes to the local filesystem, creating parent directories as needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSink;

#[async_trait]
impl FileSink for FsSink {
    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await
    }
}
