//! The content-progression engine.
//!
//! A [`ContentEngine`] owns the loaded document, the step currently shown to the operator
//! and the per-step command history. Steps are set up through a [`SetupRunner`] and left
//! once their post-checks have been cleared, strictly in queue order.

mod state;

use std::sync::Arc;

use chiron_cluster::ClusterApi;
use chiron_types::{CompletedChunkRecord, Document, PostCheck};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use state::{CommandOutcome, CurrentChunk, EngineSnapshot, EngineState, FINAL_CHUNK_HTML};

use crate::{
    condition::ConditionEvaluator,
    config::EngineConfig,
    executor::{FileSink, SetupError, SetupRunner, ShellExecutor},
    pattern::command_matches,
    poller::{ResourcePoller, TeardownError},
};

/// Infrastructure failures surfaced to the caller of an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("step setup failed: {0}")]
    Setup(#[from] SetupError),
    #[error("environment teardown failed: {0}")]
    Teardown(#[from] TeardownError),
}

/// Step state machine for a single tutorial session.
///
/// Mutating operations take `&mut self`; hosts that share the engine between tasks must
/// serialize access. Readers that must not wait for a running operation use
/// [`ContentEngine::subscribe`] instead.
pub struct ContentEngine {
    config: EngineConfig,
    poller: ResourcePoller,
    conditions: ConditionEvaluator,
    setup: SetupRunner,
    shell: Arc<dyn ShellExecutor>,
    state: EngineState,
    document: Document,
    current: Option<CurrentChunk>,
    /// Most recent record first. `None` until a document is loaded.
    history: Option<Vec<CompletedChunkRecord>>,
    snapshot: watch::Sender<EngineSnapshot>,
}

impl ContentEngine {
    pub fn new(
        config: EngineConfig,
        cluster: Arc<dyn ClusterApi>,
        sink: Arc<dyn FileSink>,
        shell: Arc<dyn ShellExecutor>,
    ) -> Self {
        let poller = ResourcePoller::new(cluster.clone(), config.poll_interval);
        let conditions = ConditionEvaluator::new(poller.clone(), config.namespace.clone());
        let setup = SetupRunner::new(config.clone(), sink, shell.clone(), cluster, conditions.clone());
        Self {
            config,
            poller,
            conditions,
            setup,
            shell,
            state: EngineState::NoContent,
            document: Document::default(),
            current: None,
            history: None,
            snapshot: watch::Sender::new(EngineSnapshot::default()),
        }
    }

    /// Receiver of the state, displayed text and history as of the last change.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Replaces any loaded document and sets up its first step.
    ///
    /// An empty document goes straight to the terminal step.
    pub async fn load(&mut self, document: Document) -> Result<(), EngineError> {
        info!(steps = document.len(), "loading document");
        self.document = document;
        self.current = None;
        self.history = Some(Vec::new());
        self.advance_to_next_step().await
    }

    /// Text of the current step, only once its setup has finished.
    pub fn current_html(&self) -> Option<&str> {
        match (&self.state, &self.current) {
            (EngineState::Done, Some(chunk)) => Some(chunk.text()),
            _ => None,
        }
    }

    /// Step records, most recent first. `None` if no document has been loaded.
    pub fn history(&self) -> Option<&[CompletedChunkRecord]> {
        self.history.as_deref()
    }

    /// Checks a submitted command, or the output of one, against the head post-check of the
    /// current step.
    ///
    /// Returns `Ok(None)` when there is nothing to evaluate: no step is ready, or the
    /// terminal step is shown. Otherwise returns whether the step was left. Errors only come
    /// from setting up the next step.
    pub async fn evaluate_operator_command(
        &mut self,
        command: Option<&str>,
        command_output: Option<&str>,
    ) -> Result<Option<bool>, EngineError> {
        if self.state != EngineState::Done {
            return Ok(None);
        }
        let Some(CurrentChunk::Step(step)) = &self.current else {
            return Ok(None);
        };
        let head = step.post_checks.front().cloned();

        if let Some(command) = command
            && let Some(record) = self.history.as_mut().and_then(|history| history.first_mut())
        {
            record.record_attempt(command);
            self.publish();
        }

        let cleared = match &head {
            None => true,
            Some(PostCheck::CommandWait { value }) => command.is_some_and(|command| command_matches(value, command)),
            Some(PostCheck::Check(condition)) => self.conditions.check(condition).await,
            Some(PostCheck::CheckCommandOut { value }) => {
                command_output.is_some_and(|output| output.contains(value.as_str()))
            }
            Some(PostCheck::Unsupported) => false,
        };
        if !cleared {
            return Ok(Some(false));
        }

        let remaining = match &mut self.current {
            Some(CurrentChunk::Step(step)) => {
                step.post_checks.pop_front();
                step.post_checks.len()
            }
            _ => 0,
        };
        debug!(remaining, "post-check cleared");
        if remaining > 0 {
            return Ok(Some(false));
        }

        self.advance_to_next_step().await?;
        Ok(Some(true))
    }

    /// Runs an operator command and reports whether the tutorial advanced.
    ///
    /// The command text is evaluated first, then the command runs, then its output is
    /// evaluated against whatever step is current by then, which is the next one if the
    /// command text already advanced. A failing command is not an engine error; its combined
    /// stderr and stdout become the output.
    pub async fn execute_operator_command(&mut self, command: &str) -> Result<CommandOutcome, EngineError> {
        let by_command = self.evaluate_operator_command(Some(command), None).await? == Some(true);

        let output = match self.shell.run(command, Some(&self.config.workspace_dir)).await {
            Ok(output) => output.display_text().to_string(),
            Err(error) => {
                debug!(%command, %error, "operator command failed");
                error.combined_output()
            }
        };

        let by_output = self.evaluate_operator_command(None, Some(&output)).await? == Some(true);

        Ok(CommandOutcome {
            advanced: by_command || by_output,
            output,
        })
    }

    /// Forgets the document and history, then removes managed resources and waits for the
    /// namespace to drain.
    pub async fn restart(&mut self) -> Result<(), EngineError> {
        info!(namespace = %self.config.namespace, "restarting");
        self.state = EngineState::NoContent;
        self.document = Document::default();
        self.current = None;
        self.history = None;
        self.publish();

        let namespace = self.config.namespace.clone();
        self.poller.teardown_all(&namespace).await?;
        self.poller.wait_until_clear(&namespace).await;
        Ok(())
    }

    async fn advance_to_next_step(&mut self) -> Result<(), EngineError> {
        if matches!(self.current, Some(CurrentChunk::Final)) {
            return Ok(());
        }
        self.state = EngineState::Processing;
        let now = Utc::now();
        let history = self.history.get_or_insert_with(Vec::new);
        if let Some(previous) = history.first_mut() {
            previous.seal(now);
        }

        let Some(step) = self.document.pop_front() else {
            info!("document exhausted");
            self.current = Some(CurrentChunk::Final);
            self.state = EngineState::Done;
            self.publish();
            return Ok(());
        };

        history.insert(0, CompletedChunkRecord::started_at(now));
        let step_index = history.len();
        info!(
            step = step_index,
            setup_actions = step.pre_commands.len(),
            post_checks = step.post_checks.len(),
            "setting up step"
        );
        self.publish();

        let prepared = self.setup.prepare(&step).await;
        self.current = Some(CurrentChunk::Step(step));
        if let Err(error) = prepared {
            warn!(step = step_index, %error, "step setup failed");
            return Err(error.into());
        }
        self.state = EngineState::Done;
        self.publish();
        Ok(())
    }

    fn publish(&self) {
        self.snapshot.send_replace(EngineSnapshot {
            state: self.state,
            html: self.current_html().map(str::to_string),
            history: self.history.clone(),
        });
    }
}
