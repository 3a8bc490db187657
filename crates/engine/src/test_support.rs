//! Fakes for the engine's external collaborators.

use std::{
    collections::{HashMap, VecDeque},
    io,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chiron_cluster::{ClusterApi, ClusterError};
use chiron_types::ResourceKind;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{Layer, layer::Context};

use crate::executor::{CommandError, CommandOutput, FileSink, ShellExecutor};

/// Scripted in-memory cluster.
///
/// Each kind has a queue of listings; every `list` call pops the front until a single
/// listing remains, which is then returned forever. Kinds without a script list as empty.
#[derive(Default)]
pub(crate) struct FakeCluster {
    listings: Mutex<HashMap<ResourceKind, VecDeque<Result<Vec<String>, String>>>>,
    list_calls: Mutex<Vec<ResourceKind>>,
    deleted: Mutex<Vec<(ResourceKind, String, String)>>,
    applied: Mutex<Vec<(String, String)>>,
    failing_apply: Mutex<Option<String>>,
    apply_delay: Mutex<Option<Duration>>,
}

impl FakeCluster {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn script(&self, kind: ResourceKind, names: &[&str]) {
        self.push_listing(kind, Ok(names.iter().map(|name| name.to_string()).collect()));
    }

    pub(crate) fn script_failure(&self, kind: ResourceKind, message: &str) {
        self.push_listing(kind, Err(message.to_string()));
    }

    pub(crate) fn fail_apply(&self, message: &str) {
        *self.failing_apply.lock().unwrap() = Some(message.to_string());
    }

    /// Makes every `apply` take `delay` before it completes.
    pub(crate) fn delay_apply(&self, delay: Duration) {
        *self.apply_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn list_calls(&self, kind: ResourceKind) -> usize {
        self.list_calls.lock().unwrap().iter().filter(|called| **called == kind).count()
    }

    pub(crate) fn deleted(&self) -> Vec<(ResourceKind, String, String)> {
        self.deleted.lock().unwrap().clone()
    }

    pub(crate) fn applied(&self) -> Vec<(String, String)> {
        self.applied.lock().unwrap().clone()
    }

    fn push_listing(&self, kind: ResourceKind, listing: Result<Vec<String>, String>) {
        self.listings.lock().unwrap().entry(kind).or_default().push_back(listing);
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list(&self, kind: ResourceKind, _namespace: &str) -> Result<Vec<String>, ClusterError> {
        self.list_calls.lock().unwrap().push(kind);
        let mut listings = self.listings.lock().unwrap();
        let Some(queue) = listings.get_mut(&kind) else {
            return Ok(Vec::new());
        };
        let listing = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        match listing {
            Some(Ok(names)) => Ok(names),
            Some(Err(message)) => Err(ClusterError::Manifest(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn delete(&self, kind: ResourceKind, name: &str, namespace: &str) -> Result<(), ClusterError> {
        self.deleted
            .lock()
            .unwrap()
            .push((kind, name.to_string(), namespace.to_string()));
        Ok(())
    }

    async fn apply(&self, manifest: &str, namespace: &str) -> Result<(), ClusterError> {
        let delay = *self.apply_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.failing_apply.lock().unwrap().clone() {
            return Err(ClusterError::Manifest(message));
        }
        self.applied.lock().unwrap().push((manifest.to_string(), namespace.to_string()));
        Ok(())
    }
}

/// Sink that keeps written files in memory.
#[derive(Default)]
pub(crate) struct RecordingSink {
    writes: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    fail: Mutex<bool>,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        let sink = Self::default();
        *sink.fail.lock().unwrap() = true;
        Arc::new(sink)
    }

    pub(crate) fn writes(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileSink for RecordingSink {
    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only sink"));
        }
        self.writes.lock().unwrap().push((path.to_path_buf(), bytes.to_vec()));
        Ok(())
    }
}

/// Shell that answers from a script and echoes unknown commands on stdout.
#[derive(Default)]
pub(crate) struct ScriptedShell {
    responses: Mutex<HashMap<String, Result<CommandOutput, CommandError>>>,
    runs: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, command: &str, stdout: &str, stderr: &str) {
        self.responses.lock().unwrap().insert(
            command.to_string(),
            Ok(CommandOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        );
    }

    pub(crate) fn fail(&self, command: &str, stdout: &str, stderr: &str) {
        self.responses.lock().unwrap().insert(
            command.to_string(),
            Err(CommandError::Failed {
                command: command.to_string(),
                code: Some(1),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        );
    }

    pub(crate) fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShellExecutor for ScriptedShell {
    async fn run(&self, command: &str, _cwd: Option<&Path>) -> Result<CommandOutput, CommandError> {
        self.runs.lock().unwrap().push(command.to_string());
        match self.responses.lock().unwrap().get(command) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(CommandError::Failed {
                command,
                code,
                stdout,
                stderr,
            })) => Err(CommandError::Failed {
                command: command.clone(),
                code: *code,
                stdout: stdout.clone(),
                stderr: stderr.clone(),
            }),
            Some(Err(CommandError::Spawn { command, source })) => Err(CommandError::Spawn {
                command: command.clone(),
                source: io::Error::new(source.kind(), source.to_string()),
            }),
            None => Ok(CommandOutput {
                stdout: format!("{command}\n"),
                stderr: String::new(),
            }),
        }
    }
}

/// Layer counting ERROR events, for asserting on logged failures.
#[derive(Clone, Default)]
pub(crate) struct ErrorCounter(Arc<AtomicUsize>);

impl ErrorCounter {
    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}
