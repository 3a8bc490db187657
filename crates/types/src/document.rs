//! Tutorial document schema.
//!
//! Documents arrive as a JSON array of steps. Setup actions and post-checks are tagged by
//! their `method` field; the redundant `type` field (`PRECOMMAND` / `POSTCHECK`) that
//! authoring tools emit is accepted and ignored.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when a document cannot be decoded.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The payload is not a valid step array.
    #[error("invalid tutorial document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ordered sequence of steps, consumed front to back as the tutorial advances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    steps: VecDeque<Step>,
}

impl Document {
    /// Decodes a document from its JSON representation.
    pub fn from_json(raw: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Decodes a document from an already parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, DocumentError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Removes and returns the next step. Popped steps are never re-entered.
    pub fn pop_front(&mut self) -> Option<Step> {
        self.steps.pop_front()
    }
}

impl From<Vec<Step>> for Document {
    fn from(steps: Vec<Step>) -> Self {
        Self { steps: steps.into() }
    }
}

/// One unit of tutorial content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// HTML fragment displayed while the step is active.
    pub text: String,
    /// Actions executed, in declaration order, before the text is exposed.
    #[serde(default)]
    pub pre_commands: Vec<SetupAction>,
    /// Conditions cleared strictly front to back before the tutorial advances.
    #[serde(default)]
    pub post_checks: VecDeque<PostCheck>,
    /// Static payloads (images and the like) referenced by `text`.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Step {
    /// Builds a step with only text, mostly useful in tests.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pre_commands: Vec::new(),
            post_checks: VecDeque::new(),
            assets: Vec::new(),
        }
    }
}

/// A named file body written to disk during setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestContent {
    pub name: String,
    pub value: String,
}

/// Base64 encoded static payload written to the asset directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub value: String,
}

/// Resource-count condition shared by WAIT setup actions and CHECK post-checks.
///
/// `kind` and `equality_operator` stay as authored so an unsupported value can be reported
/// when the condition is evaluated instead of rejecting the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCondition {
    pub kind: String,
    /// Falls back to the engine's configured namespace when absent.
    #[serde(default)]
    pub namespace: Option<String>,
    pub value: u64,
    pub equality_operator: String,
    /// Narrows the count to resource names containing (or glob-matching) this filter.
    #[serde(default)]
    pub target: Option<String>,
}

/// Setup action executed before a step's text is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum SetupAction {
    /// Write the manifest to disk and apply it to the cluster.
    #[serde(rename = "APPLY")]
    Apply { content: ManifestContent },
    /// Write the content under the include directory without applying it.
    #[serde(rename = "INCLUDEFILE")]
    IncludeFile { content: ManifestContent },
    /// Block setup until the condition holds.
    #[serde(rename = "WAIT")]
    Wait(ResourceCondition),
    /// Run a shell command and wait for it to finish.
    #[serde(rename = "EXECCOMMAND")]
    ExecCommand {
        #[serde(alias = "command")]
        value: String,
    },
    /// Any method this version does not understand.
    #[serde(other)]
    Unsupported,
}

/// Condition that must clear before the tutorial advances past a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum PostCheck {
    /// The operator typed a command matching this glob pattern (`*` is a wildcard).
    #[serde(rename = "COMMANDWAIT")]
    CommandWait { value: String },
    /// The live resource count satisfies the condition.
    #[serde(rename = "CHECK")]
    Check(ResourceCondition),
    /// The last command's output contains `value`.
    #[serde(rename = "CHECKCOMMANDOUT")]
    CheckCommandOut { value: String },
    /// Any method this version does not understand; never satisfied.
    #[serde(other)]
    Unsupported,
}
