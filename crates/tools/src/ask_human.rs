//! Human-interaction gate.
//!
//! `execute` never talks to the operator. It records the question and
//! returns a sentinel-tagged observation right away, which makes the agent
//! loop stop with a paused outcome. Whoever hosts the run then waits on
//! [`AskHuman::await_response`] and, once [`AskHuman::deliver_response`]
//! has been called, resumes the agent with the answer.
//!
//! One gate belongs to one task. It is reusable across interaction rounds
//! of that task: every new question clears whatever the previous round
//! left behind.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use stepwise_core::error::ToolError;
use stepwise_core::outcome::{interaction_request, TIMEOUT_SENTINEL};
use stepwise_core::tool::{Tool, ToolResult};
use tokio::sync::Notify;
use tracing::{debug, info};

pub const ASK_HUMAN_TOOL: &str = "ask_human";

#[derive(Debug, Default)]
struct GateState {
    question: Option<String>,
    answer: Option<String>,
}

/// Suspend/resume primitive shaped as a tool.
#[derive(Debug, Default)]
pub struct AskHuman {
    state: Mutex<GateState>,
    notify: Notify,
}

impl AskHuman {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store the operator's answer and wake any waiter.
    ///
    /// Returns whether a question was outstanding.
    pub fn deliver_response(&self, answer: impl Into<String>) -> bool {
        let had_question = {
            let mut state = self.state();
            state.answer = Some(answer.into());
            state.question.is_some()
        };
        self.notify.notify_waiters();
        debug!(had_question, "Delivered operator response");
        had_question
    }

    /// Wait for an answer without blocking other tasks.
    ///
    /// Consumes the answer and closes the round. On expiry returns
    /// [`TIMEOUT_SENTINEL`] and leaves the question outstanding.
    pub async fn await_response(&self, timeout: Duration) -> String {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a delivery between the
            // check and the await is not lost.
            notified.as_mut().enable();

            if let Some(answer) = self.take_answer() {
                return answer;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                info!(timeout_secs = timeout.as_secs(), "No operator response before timeout");
                return TIMEOUT_SENTINEL.to_string();
            }
        }
    }

    fn take_answer(&self) -> Option<String> {
        let mut state = self.state();
        let answer = state.answer.take()?;
        state.question = None;
        Some(answer)
    }

    /// The question currently waiting for an answer, if any.
    pub fn pending_question(&self) -> Option<String> {
        self.state().question.clone()
    }

    /// Forget any outstanding question and answer.
    pub fn reset(&self) {
        let mut state = self.state();
        state.question = None;
        state.answer = None;
    }
}

#[async_trait]
impl Tool for AskHuman {
    fn name(&self) -> &str {
        ASK_HUMAN_TOOL
    }

    fn description(&self) -> &str {
        "Use this tool to ask the human operator for help or clarification when the task cannot proceed without their input."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "inquire": {
                    "type": "string",
                    "description": "The question you want to ask the human."
                }
            },
            "required": ["inquire"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let question = arguments["inquire"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'inquire' argument".into()))?;

        {
            let mut state = self.state();
            state.question = Some(question.to_string());
            state.answer = None;
        }

        info!(question = %question, "Agent asked the operator a question");
        Ok(ToolResult::ok(interaction_request(question)))
    }
}
