use std::fmt;

use chiron_types::{CompletedChunkRecord, Step};

/// Text shown once the document is exhausted.
pub const FINAL_CHUNK_HTML: &str =
    "<h1>End</h1><p>You've reached the end of this document and have covered all of the content, well done!</p>\n";

/// Lifecycle of the engine with respect to the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No document loaded, or reset by restart.
    #[default]
    NoContent,
    /// The current step is being set up; its text is not exposed yet.
    Processing,
    /// The current step is set up and waiting on its post-checks.
    Done,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::NoContent => "nocontent",
            EngineState::Processing => "processing",
            EngineState::Done => "done",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The step the operator is on.
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentChunk {
    Step(Step),
    /// Synthetic terminal step. Never exited.
    Final,
}

impl CurrentChunk {
    pub fn text(&self) -> &str {
        match self {
            CurrentChunk::Step(step) => &step.text,
            CurrentChunk::Final => FINAL_CHUNK_HTML,
        }
    }
}

/// Result of running an operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// True when the command, or its output, moved the tutorial to a new step.
    pub advanced: bool,
    /// Stdout of the command, stderr when stdout is empty, or both on failure.
    pub output: String,
}

/// Read-only view of the engine, published after every change so readers never wait on a
/// running operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSnapshot {
    pub state: EngineState,
    /// Same value as [`ContentEngine::current_html`](super::ContentEngine::current_html).
    pub html: Option<String>,
    /// Most recent record first. `None` until a document is loaded.
    pub history: Option<Vec<CompletedChunkRecord>>,
}
