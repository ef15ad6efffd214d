//! Hosted task records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A single general-purpose agent.
    Agent,
    /// A planning flow with executor agents.
    Flow,
}

/// Lifecycle of a hosted task.
///
/// `pending → running → (waiting_for_input → running)* → completed | failed | terminated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    WaitingForInput { question: String },
    Completed,
    Failed { error: String },
    Terminated,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed { .. } | TaskStatus::Terminated
        )
    }

    pub fn question(&self) -> Option<&str> {
        match self {
            TaskStatus::WaitingForInput { question } => Some(question),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => f.write_str("pending"),
            TaskStatus::Running => f.write_str("running"),
            TaskStatus::WaitingForInput { .. } => f.write_str("waiting_for_input"),
            TaskStatus::Completed => f.write_str("completed"),
            TaskStatus::Failed { error } => write!(f, "failed: {error}"),
            TaskStatus::Terminated => f.write_str("terminated"),
        }
    }
}

/// Snapshot of a task for progress display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub kind: TaskKind,
    pub prompt: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Final text once the task has ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Plan driven by a flow task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
}
