//! Planning flow controller.
//!
//! `execute` either creates a plan for the request or, when the flow's plan
//! already exists, resumes it with the given input. It then walks the plan
//! strictly left to right: the first step that is not started or in
//! progress is handed to an executor agent. When no active step is left
//! the plan is summarized.
//!
//! The flow's own copy of the plan is authoritative. Every mutation is
//! applied to it first and then written through to the [`PlanStore`].
//! Writes the store rejects are queued and replayed, oldest first, before
//! the next one. Once the store has caught up the flow re-reads the plan
//! after each step, which picks up notes executors left through the
//! `planning` tool.
//!
//! Executors get the flow's [`PlanningTool`] registered with the flow's
//! plan active.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use stepwise_agent::prompts::render;
use stepwise_agent::{Agent, ModelSettings};
use stepwise_core::agent::AgentState;
use stepwise_core::error::PlanError;
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::message::Message;
use stepwise_core::outcome::{interaction_request, Outcome};
use stepwise_core::provider::{Provider, ProviderRequest, ToolChoice};
use stepwise_core::tool::Tool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::plan::{Plan, StepStatus};
use crate::planning_tool::{PlanningCommand, PlanningTool, PLANNING_TOOL};
use crate::prompts::{FINALIZE_PROMPT, PLANNING_SYSTEM_PROMPT, PLANNING_USER_PROMPT};
use crate::store::PlanStore;

pub const EMPTY_INPUT_MESSAGE: &str = "Cannot create plan for empty input";

/// Drives one plan through its executors.
pub struct PlanningFlow {
    provider: Arc<dyn Provider>,
    settings: ModelSettings,
    store: Arc<dyn PlanStore>,
    planning_tool: Arc<PlanningTool>,

    plan_id: String,
    plan: Option<Plan>,
    /// Whether the store holds the plan at all.
    stored: bool,
    /// Step updates the store has not acknowledged yet.
    unsynced: VecDeque<StepUpdate>,
    current_step: Option<usize>,

    executors: Vec<(String, Agent)>,
    executor_keys: Vec<String>,
    primary: Option<String>,

    workspace_root: PathBuf,
    event_bus: Option<EventBus>,
    cancel: CancellationToken,
}

impl PlanningFlow {
    pub fn new(provider: Arc<dyn Provider>, settings: ModelSettings, store: Arc<dyn PlanStore>) -> Self {
        Self {
            provider,
            settings,
            planning_tool: Arc::new(PlanningTool::new(store.clone())),
            store,
            plan_id: format!("plan_{}", Uuid::new_v4().simple()),
            plan: None,
            stored: false,
            unsynced: VecDeque::new(),
            current_step: None,
            executors: Vec::new(),
            executor_keys: Vec::new(),
            primary: None,
            workspace_root: PathBuf::from("."),
            event_bus: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_plan_id(mut self, plan_id: impl Into<String>) -> Self {
        self.plan_id = plan_id.into();
        self
    }

    /// Register an executor under `key`. Keys are matched against step
    /// tags case-insensitively. The first executor registered becomes the
    /// primary one unless [`with_primary`](Self::with_primary) says otherwise.
    /// The executor also gets the flow's `planning` tool.
    pub fn with_executor(mut self, key: impl Into<String>, mut agent: Agent) -> Self {
        agent.tools_mut().register(self.planning_tool.clone());
        let key = key.into().to_ascii_lowercase();
        self.executors.retain(|(k, _)| k != &key);
        self.executors.push((key, agent));
        self
    }

    /// Restrict and order the executors offered to the planner and used
    /// for untagged steps. Defaults to every registered executor.
    pub fn with_executor_keys(mut self, keys: Vec<String>) -> Self {
        self.executor_keys = keys.into_iter().map(|k| k.to_ascii_lowercase()).collect();
        self
    }

    pub fn with_primary(mut self, key: impl Into<String>) -> Self {
        self.primary = Some(key.into().to_ascii_lowercase());
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

    /// Token checked between steps. Pass the same token to the executors
    /// so a cancellation also stops the step in flight.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    /// The flow's copy of its plan.
    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// Index of the step being worked on. `None` before the first step
    /// and after the plan is done.
    pub fn current_step_index(&self) -> Option<usize> {
        self.current_step
    }

    pub fn executor(&self, key: &str) -> Option<&Agent> {
        let key = key.to_ascii_lowercase();
        self.executors
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, agent)| agent)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn active_keys(&self) -> Vec<&str> {
        if self.executor_keys.is_empty() {
            self.executors.iter().map(|(k, _)| k.as_str()).collect()
        } else {
            self.executor_keys.iter().map(String::as_str).collect()
        }
    }

    /// Pick the executor for a step: the tagged one if registered, else the
    /// first executor key that is registered, else the primary agent.
    fn select_executor(&self, tag: Option<&str>) -> Option<usize> {
        let position = |key: &str| self.executors.iter().position(|(k, _)| k == key);

        if let Some(index) = tag.and_then(|tag| position(&tag.to_ascii_lowercase())) {
            return Some(index);
        }
        if let Some(index) = self.active_keys().into_iter().find_map(|key| position(key)) {
            return Some(index);
        }
        match &self.primary {
            Some(primary) => position(primary),
            None if self.executors.is_empty() => None,
            None => Some(0),
        }
    }

    /// Run or resume the flow.
    ///
    /// The first call creates the plan from `input`. After a pause, call
    /// again with the operator's answer: the paused step is resumed with
    /// the transcript of the plan so far plus the answer.
    pub async fn execute(&mut self, input: &str) -> Outcome {
        if self.executors.is_empty() {
            error!(plan_id = %self.plan_id, "Planning flow has no executors");
            return Outcome::Failed("No executor agents available".to_string());
        }

        let mut resume_input = None;
        if self.load_plan().await {
            let upto = self
                .current_step
                .or_else(|| self.plan.as_ref().and_then(|p| p.first_active()).map(|(i, _)| i));
            let mut context = match (upto, &self.plan) {
                (Some(index), Some(plan)) => plan.transcript(index),
                _ => String::new(),
            };
            context.push_str(input);
            info!(plan_id = %self.plan_id, step = ?upto, "Resuming plan");
            resume_input = Some(context);
        } else {
            if input.trim().is_empty() {
                warn!(plan_id = %self.plan_id, "Refusing to plan for empty input");
                return Outcome::Failed(EMPTY_INPUT_MESSAGE.to_string());
            }
            let cancel = self.cancel.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Outcome::Cancelled,
                _ = self.create_initial_plan(input) => {}
            }
        }

        let mut results = String::new();
        let mut context = String::new();

        loop {
            if self.cancel.is_cancelled() {
                warn!(plan_id = %self.plan_id, step = ?self.current_step, "Flow cancelled");
                return Outcome::Cancelled;
            }

            let Some(plan) = self.plan.as_ref() else {
                return Outcome::Failed(format!("Failed to create plan for: {input}"));
            };
            let Some((index, step)) = plan.first_active() else {
                self.current_step = None;
                let summary = self.finalize().await;
                info!(plan_id = %self.plan_id, "Plan finished");
                results.push_str(&summary);
                results.push('\n');
                break;
            };

            let tag = step.executor_tag();
            let step_text = step.text.clone();
            let step_input = match resume_input.take() {
                Some(resumed) => resumed,
                None if context.is_empty() => plan.step_prompt(index),
                None => format!("{context}\n{}", plan.step_prompt(index)),
            };

            self.current_step = Some(index);
            self.mark(index, Some(StepStatus::InProgress), None).await;

            let Some(executor) = self.select_executor(tag.as_deref()) else {
                return Outcome::Failed("No executor agents available".to_string());
            };
            let (key, agent) = &mut self.executors[executor];
            info!(plan_id = %self.plan_id, step_index = index, executor = %key, step = %step_text, "Executing step");

            agent.set_state(AgentState::Idle);
            self.planning_tool.set_active(&self.plan_id);
            let result = agent.run(&step_input).await;
            self.refresh_plan().await;

            match result {
                Ok(Outcome::Paused { question }) => {
                    info!(plan_id = %self.plan_id, step_index = index, "Step paused for operator input");
                    self.mark(index, None, Some(interaction_request(&question))).await;
                    return Outcome::Paused { question };
                }
                Ok(Outcome::Cancelled) => {
                    warn!(plan_id = %self.plan_id, step_index = index, "Step cancelled");
                    return Outcome::Cancelled;
                }
                Ok(outcome) => {
                    let text = outcome.text();
                    self.mark(index, Some(StepStatus::Completed), Some(text.clone()))
                        .await;
                    info!(plan_id = %self.plan_id, step_index = index, "Step completed");
                    results.push_str(&text);
                    results.push('\n');
                }
                Err(e) => {
                    let text = format!("Error executing step {index}: {e}");
                    error!(plan_id = %self.plan_id, step_index = index, error = %e, "Step failed");
                    self.mark(index, Some(StepStatus::Blocked), Some(text.clone()))
                        .await;
                    results.push_str(&text);
                    results.push('\n');
                }
            }

            if let Some(plan) = &self.plan {
                context = plan.transcript(index);
            }
        }

        Outcome::Completed(results)
    }

    /// Whether the flow's plan exists, pulling it from the store if the
    /// flow has no copy yet.
    async fn load_plan(&mut self) -> bool {
        if self.plan.is_some() {
            return true;
        }
        match self.store.get(&self.plan_id).await {
            Ok(plan) => {
                debug!(plan_id = %self.plan_id, "Loaded existing plan from store");
                self.planning_tool.set_active(&self.plan_id);
                self.plan = Some(plan);
                self.stored = true;
                true
            }
            Err(PlanError::NotFound(_)) => false,
            Err(e) => {
                warn!(plan_id = %self.plan_id, error = %e, "Plan store lookup failed");
                false
            }
        }
    }

    async fn create_initial_plan(&mut self, request: &str) {
        info!(plan_id = %self.plan_id, "Creating initial plan");

        let executors: String = self
            .active_keys()
            .into_iter()
            .filter_map(|key| {
                self.executors
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(k, agent)| format!("- {}: {}\n", k.to_ascii_uppercase(), agent.description()))
            })
            .collect();
        let prompt = render(
            PLANNING_USER_PROMPT,
            &[("request", request), ("executors", executors.as_str())],
        );

        let llm_request = ProviderRequest::new(&self.settings.model, vec![Message::user(prompt)])
            .with_system(vec![Message::system(PLANNING_SYSTEM_PROMPT)])
            .with_tools(vec![self.planning_tool.to_definition()], ToolChoice::Auto)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);

        match self.provider.complete(llm_request).await {
            Ok(response) => {
                for call in response.message.tool_calls {
                    if call.name != PLANNING_TOOL {
                        continue;
                    }
                    let mut args = match serde_json::from_str::<serde_json::Value>(&call.arguments) {
                        Ok(args @ serde_json::Value::Object(_)) => args,
                        Ok(_) => {
                            error!(plan_id = %self.plan_id, "Planning arguments are not an object");
                            continue;
                        }
                        Err(e) => {
                            error!(plan_id = %self.plan_id, error = %e, "Failed to parse planning arguments");
                            continue;
                        }
                    };
                    args["plan_id"] = serde_json::Value::String(self.plan_id.clone());
                    if args.get("request").and_then(|r| r.as_str()).is_none_or(str::is_empty) {
                        args["request"] = serde_json::Value::String(request.to_string());
                    }

                    match PlanningCommand::parse(args).map(PlanningCommand::into_plan) {
                        Ok(Some(Ok(plan))) => {
                            self.store_new_plan(plan).await;
                            return;
                        }
                        Ok(Some(Err(e))) | Err(e) => {
                            warn!(plan_id = %self.plan_id, error = %e, "Unusable planning call");
                        }
                        Ok(None) => {
                            warn!(plan_id = %self.plan_id, "Planning call was not a create command");
                        }
                    }
                }
            }
            Err(e) => {
                error!(plan_id = %self.plan_id, error = %e, "Plan creation request failed");
            }
        }

        warn!(plan_id = %self.plan_id, "Creating default plan");
        self.store_new_plan(Plan::fallback(self.plan_id.clone(), request))
            .await;
    }

    async fn store_new_plan(&mut self, plan: Plan) {
        info!(plan_id = %plan.plan_id, "Plan ready:\n{}", plan.render());
        self.publish(DomainEvent::PlanCreated {
            plan_id: plan.plan_id.clone(),
            title: plan.title.clone(),
            steps: plan.len(),
            timestamp: Utc::now(),
        });
        self.planning_tool.set_active(&plan.plan_id);
        self.plan = Some(plan);
        self.stored = false;
        self.unsynced.clear();
        self.sync_store().await;
    }

    /// Update one step locally, then write it through to the store.
    async fn mark(&mut self, index: usize, status: Option<StepStatus>, notes: Option<String>) {
        if let Some(plan) = self.plan.as_mut() {
            plan.mark_step(index, status, notes.clone());
        }
        self.unsynced.push_back(StepUpdate {
            index,
            status,
            notes,
        });
        self.sync_store().await;

        if let Some(status) = status {
            debug!(plan_id = %self.plan_id, step_index = index, status = %status, "Step status updated");
            self.publish(DomainEvent::PlanStepUpdated {
                plan_id: self.plan_id.clone(),
                step_index: index,
                status: status.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Bring the store up to date with the local plan. Returns whether it
    /// is; a failed write stays queued for the next attempt.
    async fn sync_store(&mut self) -> bool {
        if !self.stored {
            let Some(plan) = self.plan.clone() else {
                return false;
            };
            match self.planning_tool.create(plan).await {
                // The stored plan already carries every queued update.
                Ok(_) => self.unsynced.clear(),
                Err(PlanError::AlreadyExists(_)) => {}
                Err(e) => {
                    warn!(plan_id = %self.plan_id, error = %e, "Plan store rejected new plan; keeping local copy");
                    return false;
                }
            }
            self.stored = true;
        }

        while let Some(update) = self.unsynced.front() {
            let written = self
                .store
                .mark_step(&self.plan_id, update.index, update.status, update.notes.clone())
                .await;
            if let Err(e) = written {
                warn!(
                    plan_id = %self.plan_id,
                    step_index = update.index,
                    pending = self.unsynced.len(),
                    error = %e,
                    "Plan store update failed; keeping local plan"
                );
                return false;
            }
            self.unsynced.pop_front();
        }
        true
    }

    /// Re-read the plan once the store holds every local change.
    async fn refresh_plan(&mut self) {
        if !self.sync_store().await {
            return;
        }
        match self.store.get(&self.plan_id).await {
            Ok(plan) => self.plan = Some(plan),
            Err(e) => debug!(plan_id = %self.plan_id, error = %e, "Plan refresh failed"),
        }
    }

    async fn finalize(&mut self) -> String {
        let plan_text = self
            .plan
            .as_ref()
            .map(Plan::render)
            .unwrap_or_else(|| format!("Error: Plan with ID {} not found", self.plan_id));
        let workspace = self.workspace_root.display().to_string();
        let prompt = render(
            FINALIZE_PROMPT,
            &[("workspace", workspace.as_str()), ("plan_text", plan_text.as_str())],
        );
        let request = ProviderRequest::new(&self.settings.model, vec![Message::user(prompt)])
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);

        match self.provider.complete(request).await {
            Ok(response) => format!("Plan completed:\n\n{}", response.message.content),
            Err(e) => {
                error!(plan_id = %self.plan_id, error = %e, "Plan summary failed");
                "Plan completed. Error generating summary.".to_string()
            }
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// A step update waiting to be written to the store.
#[derive(Debug, Clone)]
struct StepUpdate {
    index: usize,
    status: Option<StepStatus>,
    notes: Option<String>,
}

impl std::fmt::Debug for PlanningFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningFlow")
            .field("plan_id", &self.plan_id)
            .field("store", &self.store.name())
            .field("current_step", &self.current_step)
            .field("unsynced", &self.unsynced.len())
            .field("executors", &self.active_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryPlanStore;
    use crate::test_helpers::*;
    use serde_json::json;
    use stepwise_core::error::ProviderError;
    use stepwise_core::tool::ToolRegistry;
    use stepwise_tools::{AskHuman, TerminateTool};

    fn settings() -> ModelSettings {
        ModelSettings::new("mock-model")
    }

    fn executor(provider: Arc<SequentialMockProvider>, tools: ToolRegistry) -> Agent {
        Agent::new("flow", provider, settings())
            .with_description("Executes plan steps")
            .with_tools(tools)
            .with_max_steps(5)
    }

    fn terminate_call() -> stepwise_core::message::MessageToolCall {
        make_tool_call("terminate", json!({"status": "success"}))
    }

    fn plan_call(steps: &[&str]) -> stepwise_core::message::MessageToolCall {
        make_tool_call(
            "planning",
            json!({"command": "create", "plan_id": "ignored", "title": "Test plan", "steps": steps}),
        )
    }

    #[tokio::test]
    async fn runs_model_plan_to_completion() {
        let planner = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![plan_call(&["Research [FLOW]", "Write [FLOW]"])], ""),
            make_text_response("Everything is done."),
        ]));
        let worker = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![terminate_call()], "researched"),
            make_text_response("research summary"),
            make_tool_call_response(vec![terminate_call()], "written"),
            make_text_response("writing summary"),
        ]));
        let tools = ToolRegistry::new().with_tool(Arc::new(TerminateTool));
        let store = Arc::new(InMemoryPlanStore::new());
        let mut flow = PlanningFlow::new(planner.clone(), settings(), store.clone())
            .with_plan_id("plan_test")
            .with_executor("flow", executor(worker.clone(), tools));

        let outcome = flow.execute("write a report").await;

        let Outcome::Completed(text) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert!(text.contains("research summary\nwriting summary\nPlan completed:\n\nEverything is done."));

        let plan = store.get("plan_test").await.unwrap();
        assert_eq!(plan.request, "write a report");
        assert!(plan.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(plan.steps[0].notes, "research summary");
        assert_eq!(flow.current_step_index(), None);

        // The planner saw the planning tool and the executor list.
        let planner_requests = planner.requests();
        let plan_request = &planner_requests[0];
        assert_eq!(plan_request.tools[0].name, "planning");
        assert!(plan_request.messages[0].content.contains("- FLOW: Executes plan steps"));

        // The second step got the first step's transcript plus its own prompt.
        let second_step_input = worker.requests()[2]
            .messages
            .iter()
            .rev()
            .find(|m| m.content.starts_with("Research [FLOW]: completed: research summary"))
            .map(|m| m.content.clone())
            .unwrap();
        assert!(second_step_input.contains("Now you are on the step about 'Write [FLOW]'"));
    }

    #[tokio::test]
    async fn falls_back_to_default_plan() {
        let planner = Arc::new(SequentialMockProvider::with_results(vec![
            Err(ProviderError::Network("down".into())),
            Ok(make_text_response("summary")),
        ]));
        let worker = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(""),
            make_text_response("step 1"),
            make_text_response(""),
            make_text_response("step 2"),
            make_text_response(""),
            make_text_response("step 3"),
        ]));
        let store = Arc::new(InMemoryPlanStore::new());
        let mut flow = PlanningFlow::new(planner, settings(), store.clone())
            .with_plan_id("p")
            .with_executor("flow", executor(worker, ToolRegistry::new()));

        assert!(matches!(flow.execute("do it").await, Outcome::Completed(_)));

        let plan = store.get("p").await.unwrap();
        assert_eq!(plan.title, "Plan for: do it");
        let texts: Vec<&str> = plan.steps.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Analyze request", "Execute task", "Verify results"]);
    }

    #[tokio::test]
    async fn malformed_planning_arguments_fall_back() {
        let mut bad = make_tool_call("planning", json!({}));
        bad.arguments = "{\"command\": \"create\", \"steps\": [".into();
        let planner = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![bad],
            "",
        )]));
        let store = Arc::new(InMemoryPlanStore::new());
        let mut flow = PlanningFlow::new(planner, settings(), store.clone())
            .with_plan_id("p")
            .with_executor(
                "flow",
                executor(Arc::new(SequentialMockProvider::new(vec![])), ToolRegistry::new()),
            );
        flow.create_initial_plan("do it").await;

        assert_eq!(store.get("p").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_a_plan() {
        let planner = Arc::new(SequentialMockProvider::new(vec![]));
        let store = Arc::new(InMemoryPlanStore::new());
        let mut flow = PlanningFlow::new(planner.clone(), settings(), store.clone())
            .with_plan_id("p")
            .with_executor(
                "flow",
                executor(Arc::new(SequentialMockProvider::new(vec![])), ToolRegistry::new()),
            );

        assert_eq!(
            flow.execute("   ").await,
            Outcome::Failed(EMPTY_INPUT_MESSAGE.into())
        );
        assert_eq!(planner.call_count(), 0);
        assert!(!store.contains("p").await.unwrap());
    }

    #[tokio::test]
    async fn pause_propagates_and_resume_continues() {
        let planner = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![plan_call(&["Pick a color", "Paint the wall"])], ""),
            make_text_response("Painted blue."),
        ]));
        let worker = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![make_tool_call("ask_human", json!({"inquire": "favorite color?"}))],
                "",
            ),
            make_tool_call_response(vec![terminate_call()], "blue it is"),
            make_text_response("Chose blue"),
            make_tool_call_response(vec![terminate_call()], "painting"),
            make_text_response("Wall painted"),
        ]));
        let tools = ToolRegistry::new()
            .with_tool(Arc::new(AskHuman::new()))
            .with_tool(Arc::new(TerminateTool));
        let store = Arc::new(InMemoryPlanStore::new());
        let mut flow = PlanningFlow::new(planner.clone(), settings(), store.clone())
            .with_plan_id("p")
            .with_executor("flow", executor(worker, tools));

        let paused = flow.execute("paint the wall").await;
        assert_eq!(paused.to_string(), "INTERACTION_REQUIRED: favorite color?");

        let plan = store.get("p").await.unwrap();
        assert_eq!(plan.steps[0].status, StepStatus::InProgress);
        assert_eq!(plan.steps[0].notes, "INTERACTION_REQUIRED: favorite color?");
        assert_eq!(plan.steps[1].status, StepStatus::NotStarted);
        assert_eq!(flow.current_step_index(), Some(0));

        let resumed = flow.execute("blue").await;
        assert!(matches!(resumed, Outcome::Completed(_)));

        let plan = store.get("p").await.unwrap();
        assert_eq!(plan.steps[0].status, StepStatus::Completed);
        assert!(plan.steps[0].notes.contains("Chose blue"));
        assert_eq!(plan.steps[1].status, StepStatus::Completed);
        // Planned once, summarized once.
        assert_eq!(planner.call_count(), 2);

        let memory = flow.executor("flow").unwrap().memory();
        assert!(memory
            .messages()
            .iter()
            .any(|m| m.content == "Pick a color: in_progress: INTERACTION_REQUIRED: favorite color?\nblue"));
    }

    #[tokio::test]
    async fn store_failures_fall_back_to_local_plan() {
        let planner = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![plan_call(&["Only step"])], ""),
            make_text_response("done"),
        ]));
        let worker = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(""),
            make_text_response("step result"),
        ]));
        let mut flow = PlanningFlow::new(planner, settings(), Arc::new(BrokenStore))
            .with_executor("flow", executor(worker, ToolRegistry::new()));

        let outcome = flow.execute("anything").await;

        assert!(matches!(outcome, Outcome::Completed(_)));
        let plan = flow.plan().unwrap();
        assert_eq!(plan.steps[0].status, StepStatus::Completed);
        assert_eq!(plan.steps[0].notes, "step result");
    }

    #[tokio::test]
    async fn failed_store_write_is_replayed_without_rerunning_the_step() {
        let planner = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![plan_call(&["First", "Second"])], ""),
            make_text_response("done"),
        ]));
        let worker = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(""),
            make_text_response("first result"),
            make_text_response(""),
            make_text_response("second result"),
        ]));
        let inner = InMemoryPlanStore::new();
        // The second write marks step 0 completed.
        let store = Arc::new(FlakyStore::new(inner.clone(), vec![2]));
        let mut flow = PlanningFlow::new(planner, settings(), store.clone())
            .with_plan_id("p")
            .with_executor("flow", executor(worker.clone(), ToolRegistry::new()));

        let outcome = flow.execute("two steps").await;

        let Outcome::Completed(text) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(worker.call_count(), 4);
        assert_eq!(text.matches("first result").count(), 1);
        assert!(text.starts_with("first result\nsecond result\n"));

        let local = flow.plan().unwrap();
        assert_eq!(local.steps[0].status, StepStatus::Completed);
        assert_eq!(local.steps[0].notes, "first result");

        let stored = inner.get("p").await.unwrap();
        assert_eq!(stored.steps, local.steps);
        assert_eq!(store.mark_calls(), 5);
    }

    #[tokio::test]
    async fn executors_see_and_edit_the_flow_plan() {
        let planner = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![plan_call(&["Check the plan", "Ship it"])], ""),
            make_text_response("wrapped up"),
        ]));
        let worker = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![
                    make_tool_call("planning", json!({"command": "get"})),
                    make_tool_call(
                        "planning",
                        json!({
                            "command": "mark_step",
                            "step_index": 1,
                            "step_status": "blocked",
                            "step_notes": "Needs approval"
                        }),
                    ),
                ],
                "",
            ),
            make_tool_call_response(vec![terminate_call()], "checked"),
            make_text_response("plan checked"),
        ]));
        let tools = ToolRegistry::new().with_tool(Arc::new(TerminateTool));
        let store = Arc::new(InMemoryPlanStore::new());
        let mut flow = PlanningFlow::new(planner, settings(), store.clone())
            .with_plan_id("p")
            .with_executor("flow", executor(worker.clone(), tools));
        assert!(flow.executor("flow").unwrap().tools().contains(PLANNING_TOOL));

        let outcome = flow.execute("ship the release").await;

        assert!(matches!(outcome, Outcome::Completed(_)));
        // The blocked step is skipped, so step 0 is the only one run.
        assert_eq!(worker.call_count(), 3);
        assert!(worker.requests()[1]
            .messages
            .iter()
            .any(|m| m.content.contains("Plan: Test plan (ID: p)")));

        let plan = store.get("p").await.unwrap();
        assert_eq!(plan.steps[0].status, StepStatus::Completed);
        assert_eq!(plan.steps[1].status, StepStatus::Blocked);
        assert_eq!(plan.steps[1].notes, "Needs approval");
        assert_eq!(flow.plan().unwrap().steps, plan.steps);
    }

    #[tokio::test]
    async fn tagged_steps_use_matching_executor() {
        let planner = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![plan_call(&["Search [search]", "Summarize"])], ""),
            make_text_response("final"),
        ]));
        let general = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(""),
            make_text_response("general did it"),
        ]));
        let searcher = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(""),
            make_text_response("search did it"),
        ]));
        let store = Arc::new(InMemoryPlanStore::new());
        let mut flow = PlanningFlow::new(planner, settings(), store.clone())
            .with_plan_id("p")
            .with_executor("flow", executor(general.clone(), ToolRegistry::new()))
            .with_executor("SEARCH", executor(searcher.clone(), ToolRegistry::new()));

        flow.execute("find things").await;

        let plan = store.get("p").await.unwrap();
        assert_eq!(plan.steps[0].notes, "search did it");
        assert_eq!(plan.steps[1].notes, "general did it");
        assert_eq!(searcher.call_count(), 2);
        assert_eq!(general.call_count(), 2);
    }

    #[test]
    fn executor_selection_order() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let agent = || executor(provider.clone(), ToolRegistry::new());
        let flow = PlanningFlow::new(provider.clone(), settings(), Arc::new(InMemoryPlanStore::new()))
            .with_executor("a", agent())
            .with_executor("b", agent())
            .with_executor_keys(vec!["B".into()]);

        assert_eq!(flow.select_executor(Some("A")), Some(0));
        assert_eq!(flow.select_executor(Some("missing")), Some(1));
        assert_eq!(flow.select_executor(None), Some(1));

        let primary_only = PlanningFlow::new(provider.clone(), settings(), Arc::new(InMemoryPlanStore::new()))
            .with_executor("a", agent())
            .with_executor("b", agent())
            .with_executor_keys(vec!["ghost".into()])
            .with_primary("b");
        assert_eq!(primary_only.select_executor(None), Some(1));
    }

    #[tokio::test]
    async fn cancellation_stops_the_flow_mid_step() {
        let planner = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![plan_call(&["Long step", "Never reached"])],
            "",
        )]));
        let worker = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call("cancel_me", json!({}))],
            "",
        )]));
        let token = CancellationToken::new();
        let tools = ToolRegistry::new().with_tool(Arc::new(CancellingTool::new(token.clone())));
        let store = Arc::new(InMemoryPlanStore::new());
        let mut flow = PlanningFlow::new(planner, settings(), store.clone())
            .with_plan_id("p")
            .with_cancellation(token.clone())
            .with_executor(
                "flow",
                executor(worker.clone(), tools).with_cancellation(token),
            );

        assert_eq!(flow.execute("go").await, Outcome::Cancelled);

        let plan = store.get("p").await.unwrap();
        assert_eq!(plan.steps[0].status, StepStatus::InProgress);
        assert_eq!(plan.steps[1].status, StepStatus::NotStarted);
        // No summary call after the cancellation.
        assert_eq!(worker.call_count(), 1);
    }
}
