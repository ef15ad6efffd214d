//! Shared test helpers for flow tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use stepwise_core::error::{PlanError, ProviderError, ToolError};
use stepwise_core::message::{Message, MessageToolCall};
use stepwise_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use stepwise_core::tool::{Tool, ToolResult};
use tokio_util::sync::CancellationToken;

use crate::plan::{Plan, StepStatus};
use crate::store::{InMemoryPlanStore, PlanStore};

/// A mock provider that returns a sequence of scripted results.
///
/// Each call to `complete` returns the next result in the queue and
/// records the request it was given. Panics if more calls are made than
/// results provided.
pub struct SequentialMockProvider {
    results: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            results: Mutex::new(results),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let results = self.results.lock().unwrap();
        let count = requests.len();

        if count >= results.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{count}, have {})",
                results.len()
            );
        }

        requests.push(request);
        results[count].clone()
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls(thought, tool_calls),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{}", next_call_suffix()),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

fn next_call_suffix() -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed).to_string()
}

/// Cancels the given token, then never completes.
pub struct CancellingTool {
    token: CancellationToken,
}

impl CancellingTool {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Tool for CancellingTool {
    fn name(&self) -> &str {
        "cancel_me"
    }
    fn description(&self) -> &str {
        "Cancels the run it belongs to"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.token.cancel();
        std::future::pending().await
    }
}

/// A plan store whose every operation fails.
pub struct BrokenStore;

#[async_trait]
impl PlanStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn create(&self, _plan: Plan) -> Result<Plan, PlanError> {
        Err(PlanError::Storage("disk on fire".into()))
    }

    async fn get(&self, _plan_id: &str) -> Result<Plan, PlanError> {
        Err(PlanError::Storage("disk on fire".into()))
    }

    async fn mark_step(
        &self,
        _plan_id: &str,
        _index: usize,
        _status: Option<StepStatus>,
        _notes: Option<String>,
    ) -> Result<Plan, PlanError> {
        Err(PlanError::Storage("disk on fire".into()))
    }

    async fn list(&self) -> Result<Vec<Plan>, PlanError> {
        Err(PlanError::Storage("disk on fire".into()))
    }
}

/// An in-memory store whose `mark_step` fails on the listed calls
/// (1-based) and succeeds otherwise.
pub struct FlakyStore {
    inner: InMemoryPlanStore,
    fail_on: Vec<usize>,
    mark_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: InMemoryPlanStore, fail_on: Vec<usize>) -> Self {
        Self {
            inner,
            fail_on,
            mark_calls: AtomicUsize::new(0),
        }
    }

    pub fn mark_calls(&self) -> usize {
        self.mark_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn create(&self, plan: Plan) -> Result<Plan, PlanError> {
        self.inner.create(plan).await
    }

    async fn get(&self, plan_id: &str) -> Result<Plan, PlanError> {
        self.inner.get(plan_id).await
    }

    async fn mark_step(
        &self,
        plan_id: &str,
        index: usize,
        status: Option<StepStatus>,
        notes: Option<String>,
    ) -> Result<Plan, PlanError> {
        let call = self.mark_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&call) {
            return Err(PlanError::Storage("write timed out".into()));
        }
        self.inner.mark_step(plan_id, index, status, notes).await
    }

    async fn list(&self) -> Result<Vec<Plan>, PlanError> {
        self.inner.list().await
    }
}
