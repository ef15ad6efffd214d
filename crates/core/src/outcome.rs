//! Run outcomes and the human-interaction sentinel.
//!
//! Tools signal "ask the operator" by returning text that starts with
//! [`INTERACTION_SENTINEL`]. The agent loop parses that marker once, in
//! its act phase, and from then on the pause travels as
//! [`Outcome::Paused`]. `Display` renders the sentinel back so callers that
//! poll the string form keep working.

use serde::{Deserialize, Serialize};

/// Marker prefix carried by a tool observation that needs human input.
pub const INTERACTION_SENTINEL: &str = "INTERACTION_REQUIRED:";

/// Returned by a gate wait that expired before an answer arrived.
pub const TIMEOUT_SENTINEL: &str = "TIMEOUT: No response received from user";

/// Format a question as a sentinel-tagged observation.
pub fn interaction_request(question: &str) -> String {
    format!("{INTERACTION_SENTINEL} {question}")
}

/// Extract the question from text containing the sentinel, if any.
pub fn extract_interaction(text: &str) -> Option<&str> {
    text.find(INTERACTION_SENTINEL)
        .map(|idx| text[idx + INTERACTION_SENTINEL.len()..].trim())
}

/// The result of an agent run or a flow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// Ran to the end; carries the final summary.
    Completed(String),
    /// Waiting for the operator; resume with a fresh run carrying the answer.
    Paused { question: String },
    /// Aborted by an error; carries whatever text was produced anyway.
    Failed(String),
    /// Stopped by an external cancellation request.
    Cancelled,
}

impl Outcome {
    pub fn paused(question: impl Into<String>) -> Self {
        Outcome::Paused {
            question: question.into(),
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Outcome::Paused { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn question(&self) -> Option<&str> {
        match self {
            Outcome::Paused { question } => Some(question),
            _ => None,
        }
    }

    /// The text form, identical to `to_string()`.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Completed(text) | Outcome::Failed(text) => f.write_str(text),
            Outcome::Paused { question } => write!(f, "{INTERACTION_SENTINEL} {question}"),
            Outcome::Cancelled => f.write_str("Task was cancelled"),
        }
    }
}
