//! The agent step loop.
//!
//! An [`Agent`] drives a model through think/act iterations until the model
//! calls a finishing tool, the step budget runs out, an error aborts the
//! loop, a tool asks the operator something, or the run is cancelled.
//! Every exit except a pause and a cancellation ends with a summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use stepwise_core::agent::AgentState;
use stepwise_core::error::{MemoryError, ProviderError, StateError};
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::memory::Memory;
use stepwise_core::message::{Message, MessageToolCall};
use stepwise_core::outcome::{extract_interaction, Outcome};
use stepwise_core::provider::{Provider, ProviderRequest, ToolChoice};
use stepwise_core::tool::{ToolCall, ToolRegistry};
use stepwise_tools::TERMINATE_TOOL;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::prompts::{self, render};

/// Model parameters sent with every request an agent makes.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// What the think phase decided.
#[derive(Debug, Clone)]
pub struct Thought {
    pub should_continue: bool,
    pub content: String,
    pub tool_calls: Vec<MessageToolCall>,
}

/// How the step loop ended.
enum LoopExit {
    /// Budget exhausted, FINISHED requested, or the model had nothing to add.
    Done,
    /// An iteration failed; the error is already in memory.
    Failed,
    Paused(String),
    Cancelled,
}

/// Result of one act phase.
struct Acted {
    observations: Vec<String>,
    question: Option<String>,
}

/// A single tool-calling agent.
///
/// Memory and state belong to this instance alone. One run at a time:
/// `run` takes `&mut self`.
pub struct Agent {
    name: String,
    description: String,
    provider: Arc<dyn Provider>,
    settings: ModelSettings,

    system_prompt: String,
    next_step_prompt: String,
    summarize_prompt: String,
    stuck_notice: bool,

    tools: ToolRegistry,
    finish_tools: Vec<String>,

    memory: Memory,
    state: AgentState,
    current_step: usize,
    max_steps: usize,
    duplicate_threshold: usize,
    max_observe: usize,

    workspace_root: PathBuf,
    task_request: Option<String>,
    awaiting_input: bool,

    event_bus: Option<EventBus>,
    cancel: CancellationToken,
}

impl Agent {
    /// Create an agent with the general-purpose prompts and no tools.
    pub fn new(name: impl Into<String>, provider: Arc<dyn Provider>, settings: ModelSettings) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            provider,
            settings,
            system_prompt: prompts::SYSTEM_PROMPT.to_string(),
            next_step_prompt: prompts::NEXT_STEP_PROMPT.to_string(),
            summarize_prompt: prompts::SUMMARIZE_PROMPT.to_string(),
            stuck_notice: false,
            tools: ToolRegistry::new(),
            finish_tools: vec![TERMINATE_TOOL.to_string()],
            memory: Memory::new(),
            state: AgentState::Idle,
            current_step: 0,
            max_steps: 20,
            duplicate_threshold: 2,
            max_observe: 10_000,
            workspace_root: PathBuf::from("."),
            task_request: None,
            awaiting_input: false,
            event_bus: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the system prompt template (`{directory}` is filled in).
    pub fn with_system_prompt(mut self, template: impl Into<String>) -> Self {
        self.system_prompt = template.into();
        self
    }

    /// Set the next-step prompt template (`{request}` is filled in).
    pub fn with_next_step_prompt(mut self, template: impl Into<String>) -> Self {
        self.next_step_prompt = template.into();
        self
    }

    pub fn with_summarize_prompt(mut self, template: impl Into<String>) -> Self {
        self.summarize_prompt = template.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Tools whose successful execution marks the agent `FINISHED`.
    pub fn with_finish_tools(mut self, names: Vec<String>) -> Self {
        self.finish_tools = names;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: usize) -> Self {
        self.duplicate_threshold = threshold.max(1);
        self
    }

    /// Truncate tool observations to this many characters.
    pub fn with_max_observe(mut self, max_observe: usize) -> Self {
        self.max_observe = max_observe;
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Force a state. Flows use this to re-arm an executor that finished
    /// its previous step.
    pub fn set_state(&mut self, state: AgentState) {
        debug!(agent = %self.name, from = %self.state, to = %state, "State set");
        self.state = state;
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Append a message by role name.
    pub fn update_memory(
        &mut self,
        role: &str,
        content: impl Into<String>,
        base64_image: Option<String>,
        tool_call_id: Option<String>,
    ) -> Result<(), MemoryError> {
        self.memory.append(role, content, base64_image, tool_call_id)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Mutable access for adding or removing tools between runs.
    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the last run stopped to wait for the operator.
    pub fn is_awaiting_input(&self) -> bool {
        self.awaiting_input
    }

    /// The next-step prompt as it will be sent, stuck notice included.
    pub fn next_step_prompt(&self) -> String {
        let request = self.task_request.as_deref().unwrap_or_default();
        let rendered = render(&self.next_step_prompt, &[("request", request)]);
        if self.stuck_notice {
            format!("{}\n{rendered}", prompts::STUCK_PROMPT)
        } else {
            rendered
        }
    }

    fn system_message(&self) -> Message {
        let directory = self.workspace_root.display().to_string();
        Message::system(render(&self.system_prompt, &[("directory", directory.as_str())]))
    }

    /// Clear memory and state so the agent can take a new task.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.state = AgentState::Idle;
        self.current_step = 0;
        self.stuck_notice = false;
        self.task_request = None;
        self.awaiting_input = false;
    }

    /// Run the step loop.
    ///
    /// A non-empty `request` is appended to memory as a user message. After
    /// a pause, call `run` again with the operator's answer; the original
    /// task stays the one the summary refers to.
    ///
    /// Running an agent that is `FINISHED` or already `RUNNING` is a
    /// contract violation and returns `Err`. Everything else, model and
    /// tool failures included, ends in an [`Outcome`].
    pub async fn run(&mut self, request: &str) -> Result<Outcome, StateError> {
        match self.state {
            AgentState::Finished => return Err(StateError::AlreadyFinished(self.name.clone())),
            AgentState::Running => return Err(StateError::Busy(self.name.clone())),
            AgentState::Idle | AgentState::Error => {}
        }

        if !request.is_empty() {
            self.memory.push(Message::user(request));
            if !self.awaiting_input || self.task_request.is_none() {
                self.task_request = Some(request.to_string());
            }
        }
        self.awaiting_input = false;
        self.current_step = 0;

        let previous = self.state;
        self.state = AgentState::Running;
        info!(agent = %self.name, max_steps = self.max_steps, "Agent run starting");

        let exit = self.step_loop().await;

        // FINISHED survives the scope; everything else reverts.
        let finished = self.state == AgentState::Finished;
        let outcome = match exit {
            LoopExit::Paused(question) => {
                self.awaiting_input = true;
                self.state = AgentState::Idle;
                info!(agent = %self.name, question = %question, "Run paused for operator input");
                self.publish(DomainEvent::InteractionRequired {
                    agent: self.name.clone(),
                    question: question.clone(),
                    timestamp: Utc::now(),
                });
                return Ok(Outcome::Paused { question });
            }
            LoopExit::Cancelled => {
                warn!(agent = %self.name, step = self.current_step, "Run cancelled");
                self.memory
                    .push(Message::assistant("Execution was cancelled before the task completed."));
                Outcome::Cancelled
            }
            LoopExit::Done => Outcome::Completed(self.summarize().await),
            LoopExit::Failed => Outcome::Failed(self.summarize().await),
        };

        self.state = if finished { AgentState::Finished } else { previous };
        info!(agent = %self.name, state = %self.state, steps = self.current_step, "Agent run finished");
        Ok(outcome)
    }

    async fn step_loop(&mut self) -> LoopExit {
        let cancel = self.cancel.clone();
        let mut last_response: Option<String> = None;
        let mut duplicate_run = 0usize;

        while self.current_step < self.max_steps && self.state != AgentState::Finished {
            if cancel.is_cancelled() {
                return LoopExit::Cancelled;
            }

            let step = self.current_step + 1;
            info!(agent = %self.name, step, max_steps = self.max_steps, "Executing step");
            self.publish(DomainEvent::AgentStepStarted {
                agent: self.name.clone(),
                step,
                max_steps: self.max_steps,
                timestamp: Utc::now(),
            });

            let thought = tokio::select! {
                biased;
                _ = cancel.cancelled() => return LoopExit::Cancelled,
                thought = self.think() => thought,
            };
            let thought = match thought {
                Ok(thought) => thought,
                Err(e) => {
                    self.record_failure(step, &e.to_string());
                    return LoopExit::Failed;
                }
            };

            if !thought.should_continue {
                debug!(agent = %self.name, step, "Model has nothing further; stopping");
                break;
            }

            if !thought.tool_calls.is_empty() {
                if cancel.is_cancelled() {
                    return LoopExit::Cancelled;
                }
                let acted = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return LoopExit::Cancelled,
                    acted = self.act(&thought.tool_calls) => acted,
                };
                if let Some(question) = acted.question {
                    return LoopExit::Paused(question);
                }
                debug!(agent = %self.name, step, observations = acted.observations.len(), "Act phase done");
                if cancel.is_cancelled() {
                    return LoopExit::Cancelled;
                }
            }

            if last_response.as_deref() == Some(thought.content.as_str()) {
                duplicate_run += 1;
            } else {
                duplicate_run = 1;
            }
            last_response = Some(thought.content);

            if duplicate_run >= self.duplicate_threshold {
                self.handle_stuck_state(step);
                duplicate_run = 0;
                last_response = None;
            }

            self.current_step = step;
        }

        if self.current_step >= self.max_steps {
            info!(agent = %self.name, max_steps = self.max_steps, "Step budget exhausted");
        }
        LoopExit::Done
    }

    fn record_failure(&mut self, step: usize, reason: &str) {
        self.state = AgentState::Error;
        error!(agent = %self.name, step, error = %reason, "Step failed");
        self.memory
            .push(Message::assistant(format!("Error encountered: {reason}")));
    }

    /// Ask the model for its next move and record the reply in memory.
    pub async fn think(&mut self) -> Result<Thought, ProviderError> {
        let mut messages = self.memory.messages().to_vec();
        let next = self.next_step_prompt();
        if !next.trim().is_empty() {
            messages.push(Message::user(next));
        }

        let request = ProviderRequest::new(&self.settings.model, messages)
            .with_system(vec![self.system_message()])
            .with_tools(self.tools.definitions(), ToolChoice::Auto)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);

        let response = self.provider.complete(request).await?;
        let reply = response.message;

        debug!(
            agent = %self.name,
            content_len = reply.content.len(),
            tool_calls = reply.tool_calls.len(),
            "Model replied"
        );
        if !reply.tool_calls.is_empty() {
            let names: Vec<&str> = reply.tool_calls.iter().map(|c| c.name.as_str()).collect();
            info!(agent = %self.name, tools = ?names, "Model selected tools");
        }

        let thought = Thought {
            should_continue: !reply.tool_calls.is_empty() || !reply.content.is_empty(),
            content: reply.content.clone(),
            tool_calls: reply.tool_calls.clone(),
        };
        self.memory
            .push(Message::assistant_with_calls(reply.content, reply.tool_calls));
        Ok(thought)
    }

    /// Execute the selected calls in order against a snapshot of the tools.
    async fn act(&mut self, calls: &[MessageToolCall]) -> Acted {
        let tools = self.tools.snapshot();
        let mut observations = Vec::with_capacity(calls.len());
        let mut question = None;

        for call in calls {
            let observation = self.execute_tool(&tools, call).await;
            // Read the question before truncation can cut it off.
            if question.is_none() {
                question = extract_interaction(&observation).map(str::to_string);
            }
            let observation = truncate_chars(observation, self.max_observe);

            self.memory
                .push(Message::tool_result(&call.id, &call.name, &observation));
            observations.push(observation);
        }

        Acted {
            observations,
            question,
        }
    }

    async fn execute_tool(&mut self, tools: &ToolRegistry, call: &MessageToolCall) -> String {
        let arguments = if call.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str::<serde_json::Value>(&call.arguments) {
                Ok(args) => args,
                Err(e) => {
                    warn!(agent = %self.name, tool = %call.name, error = %e, "Malformed tool arguments");
                    return format!(
                        "Error: Failed to parse arguments for tool '{}': {e}",
                        call.name
                    );
                }
            }
        };

        let tool_call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        };

        info!(agent = %self.name, tool = %call.name, "Executing tool");
        let start = Instant::now();
        let result = tools.execute(&tool_call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (success, observation) = match result {
            Ok(result) => {
                if result.success && self.finish_tools.iter().any(|n| n == &call.name) {
                    info!(agent = %self.name, tool = %call.name, "Finishing tool executed");
                    self.state = AgentState::Finished;
                }
                let text = if result.output.is_empty() {
                    format!("Cmd `{}` completed with no output", call.name)
                } else {
                    format!("Observed output of cmd `{}` executed:\n{}", call.name, result.output)
                };
                (result.success, text)
            }
            Err(e) => {
                warn!(agent = %self.name, tool = %call.name, error = %e, "Tool failed");
                (false, format!("Error: {e}"))
            }
        };

        self.publish(DomainEvent::ToolExecuted {
            agent: self.name.clone(),
            tool_name: call.name.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
        observation
    }

    /// Whether the latest message repeats earlier assistant output at
    /// least `duplicate_threshold` times.
    pub fn is_stuck(&self) -> bool {
        self.memory.repeats_of_last() >= self.duplicate_threshold
    }

    /// Prepend the corrective notice to the next-step prompt. Repeated
    /// triggers keep a single copy.
    fn handle_stuck_state(&mut self, step: usize) {
        warn!(agent = %self.name, step, "Duplicate responses detected; asking the model to change strategy");
        self.stuck_notice = true;
        self.publish(DomainEvent::StuckDetected {
            agent: self.name.clone(),
            step,
            timestamp: Utc::now(),
        });
    }

    /// Ask the model for a final summary of the task.
    ///
    /// Never fails: a model error is recorded in memory and a fixed
    /// fallback text is returned.
    pub async fn summarize(&mut self) -> String {
        let request = self.task_request.clone().unwrap_or_default();
        let directory = self.workspace_root.display().to_string();
        let prompt = render(
            &self.summarize_prompt,
            &[("request", request.as_str()), ("directory", directory.as_str())],
        );
        self.memory.push(Message::user(prompt));

        let request = ProviderRequest::new(&self.settings.model, self.memory.messages().to_vec())
            .with_system(vec![self.system_message()])
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);

        match self.provider.complete(request).await {
            Ok(response) => {
                let summary = response.message.content;
                self.memory.push(Message::assistant(summary.clone()));
                summary
            }
            Err(e) => {
                error!(agent = %self.name, error = %e, "Summary generation failed");
                self.memory.push(Message::assistant(format!(
                    "Error encountered while processing: {e}"
                )));
                "summary encountered an error, please try again".to_string()
            }
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("current_step", &self.current_step)
            .field("max_steps", &self.max_steps)
            .field("tools", &self.tools)
            .field("memory_len", &self.memory.len())
            .finish()
    }
}

fn truncate_chars(text: String, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text;
    }
    text.chars().take(max).collect()
}
