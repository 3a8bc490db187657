//! Per-step audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit entry for one step the operator has entered.
///
/// Records are append-only: commands are pushed while the step is active and `end_time`
/// is sealed exactly once when the step is left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedChunkRecord {
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Every command submitted while the step was active, in submission order.
    #[serde(default)]
    pub command_attempts: Vec<String>,
}

impl CompletedChunkRecord {
    /// Opens a record for a step entered at `start_time`.
    pub fn started_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: None,
            command_attempts: Vec::new(),
        }
    }

    /// True until the record has been sealed.
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Appends a command attempt. Sealed records are left untouched.
    pub fn record_attempt(&mut self, command: impl Into<String>) {
        if self.is_active() {
            self.command_attempts.push(command.into());
        }
    }

    /// Sets `end_time` if it has not been set yet.
    pub fn seal(&mut self, end_time: DateTime<Utc>) {
        if self.end_time.is_none() {
            self.end_time = Some(end_time);
        }
    }
}
