//! Task manager: hosts agent and flow runs as independent tokio tasks.
//!
//! Each task owns its agent or flow, its own `ask_human` gate and its own
//! cancellation token. When a run pauses, the task waits on the gate until
//! [`TaskManager::respond`] delivers an answer (or the interaction timeout
//! expires), then resumes the run with that answer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use stepwise_agent::presets::{self, FLOW_AGENT_NAME};
use stepwise_agent::Agent;
use stepwise_config::AppConfig;
use stepwise_core::error::PlanError;
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::outcome::{Outcome, TIMEOUT_SENTINEL};
use stepwise_core::provider::Provider;
use stepwise_core::tool::ToolRegistry;
use stepwise_flow::{Plan, PlanStore, PlanningFlow};
use stepwise_tools::{default_registry, AskHuman, ToolOptions};
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::task::{TaskInfo, TaskKind, TaskStatus};

/// Something a task can start and resume.
#[async_trait]
trait Resumable: Send {
    async fn advance(&mut self, input: &str) -> Outcome;
}

#[async_trait]
impl Resumable for Agent {
    async fn advance(&mut self, input: &str) -> Outcome {
        self.run(input)
            .await
            .unwrap_or_else(|e| Outcome::Failed(e.to_string()))
    }
}

#[async_trait]
impl Resumable for PlanningFlow {
    async fn advance(&mut self, input: &str) -> Outcome {
        self.execute(input).await
    }
}

struct TaskEntry {
    info: TaskInfo,
    status_tx: watch::Sender<TaskStatus>,
    gate: Arc<AskHuman>,
    cancel: CancellationToken,
}

struct Inner {
    config: AppConfig,
    provider: Arc<dyn Provider>,
    plan_store: Arc<dyn PlanStore>,
    events: EventBus,
    tasks: RwLock<HashMap<String, TaskEntry>>,
}

impl Inner {
    /// Record a status change. A terminated task keeps that status.
    async fn set_status(&self, task_id: &str, status: TaskStatus, result: Option<String>) {
        {
            let mut tasks = self.tasks.write().await;
            let Some(entry) = tasks.get_mut(task_id) else {
                return;
            };
            if entry.info.status == TaskStatus::Terminated {
                debug!(task_id, ignored = %status, "Task already terminated");
                return;
            }
            entry.info.status = status.clone();
            entry.info.updated_at = Utc::now();
            if result.is_some() {
                entry.info.result = result;
            }
            entry.status_tx.send_replace(status.clone());
        }

        info!(task_id, status = %status, "Task status changed");
        self.events.publish(DomainEvent::TaskStatusChanged {
            task_id: task_id.to_string(),
            status: status.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn interaction_timeout(&self) -> Duration {
        Duration::from_secs(self.config.interaction.timeout_secs)
    }
}

/// Hosts concurrent tasks. Cheap to clone.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    pub fn new(config: AppConfig, provider: Arc<dyn Provider>, plan_store: Arc<dyn PlanStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                provider,
                plan_store,
                events: EventBus::default(),
                tasks: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Share an existing event bus with the manager and everything it runs.
    /// Call before the manager is cloned.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.events = events,
            None => warn!("Task manager already shared; event bus not replaced"),
        }
        self
    }

    pub fn events(&self) -> EventBus {
        self.inner.events.clone()
    }

    fn tool_options(&self) -> ToolOptions {
        let config = &self.inner.config;
        ToolOptions {
            workspace_root: config.workspace_root.clone(),
            shell_enabled: config.tools.shell_enabled,
            shell_timeout: Duration::from_secs(config.tools.shell_timeout_secs),
        }
    }

    fn tools_for(&self, gate: &Arc<AskHuman>) -> ToolRegistry {
        default_registry(&self.tool_options(), gate.clone())
    }

    /// Start a single-agent task.
    pub async fn spawn_agent(&self, prompt: &str) -> Result<String, RuntimeError> {
        let (task_id, gate, cancel) = self.register(prompt, TaskKind::Agent, None).await?;

        let config = &self.inner.config;
        let agent = presets::general_agent(config, self.inner.provider.clone(), self.tools_for(&gate))
            .with_cancellation(cancel.clone())
            .with_event_bus(self.inner.events.clone());

        self.launch(task_id.clone(), agent, prompt.to_string(), gate, cancel);
        Ok(task_id)
    }

    /// Start a planning-flow task.
    pub async fn spawn_flow(&self, prompt: &str) -> Result<String, RuntimeError> {
        let plan_id = format!("plan_{}", Uuid::new_v4().simple());
        let (task_id, gate, cancel) = self
            .register(prompt, TaskKind::Flow, Some(plan_id.clone()))
            .await?;

        let config = &self.inner.config;
        let executor = presets::flow_step_agent(config, self.inner.provider.clone(), self.tools_for(&gate))
            .with_cancellation(cancel.clone())
            .with_event_bus(self.inner.events.clone());
        let flow = PlanningFlow::new(
            self.inner.provider.clone(),
            presets::model_settings(config),
            self.inner.plan_store.clone(),
        )
        .with_plan_id(plan_id)
        .with_executor(FLOW_AGENT_NAME, executor)
        .with_workspace_root(&config.workspace_root)
        .with_event_bus(self.inner.events.clone())
        .with_cancellation(cancel.clone());

        self.launch(task_id.clone(), flow, prompt.to_string(), gate, cancel);
        Ok(task_id)
    }

    async fn register(
        &self,
        prompt: &str,
        kind: TaskKind,
        plan_id: Option<String>,
    ) -> Result<(String, Arc<AskHuman>, CancellationToken), RuntimeError> {
        if prompt.trim().is_empty() {
            return Err(RuntimeError::EmptyPrompt);
        }

        let task_id = Uuid::new_v4().to_string();
        let gate = Arc::new(AskHuman::new());
        let cancel = CancellationToken::new();
        let now = Utc::now();
        let (status_tx, _) = watch::channel(TaskStatus::Pending);

        let entry = TaskEntry {
            info: TaskInfo {
                id: task_id.clone(),
                kind,
                prompt: prompt.to_string(),
                status: TaskStatus::Pending,
                created_at: now,
                updated_at: now,
                result: None,
                plan_id,
            },
            status_tx,
            gate: gate.clone(),
            cancel: cancel.clone(),
        };
        self.inner.tasks.write().await.insert(task_id.clone(), entry);
        info!(task_id = %task_id, kind = ?kind, "Task created");
        Ok((task_id, gate, cancel))
    }

    fn launch<R: Resumable + 'static>(
        &self,
        task_id: String,
        runner: R,
        prompt: String,
        gate: Arc<AskHuman>,
        cancel: CancellationToken,
    ) {
        let inner = self.inner.clone();
        tokio::spawn(drive(inner, task_id, runner, prompt, gate, cancel));
    }

    /// Deliver the operator's answer to a task waiting for input.
    pub async fn respond(&self, task_id: &str, answer: &str) -> Result<(), RuntimeError> {
        let tasks = self.inner.tasks.read().await;
        let entry = tasks
            .get(task_id)
            .ok_or_else(|| RuntimeError::TaskNotFound(task_id.to_string()))?;
        if entry.info.status.is_terminal() || !entry.gate.deliver_response(answer) {
            return Err(RuntimeError::NotWaiting(task_id.to_string()));
        }
        info!(task_id, "Operator answered");
        Ok(())
    }

    /// Cancel a task and mark it terminated.
    pub async fn terminate(&self, task_id: &str) -> Result<(), RuntimeError> {
        {
            let tasks = self.inner.tasks.read().await;
            let entry = tasks
                .get(task_id)
                .ok_or_else(|| RuntimeError::TaskNotFound(task_id.to_string()))?;
            if entry.info.status.is_terminal() {
                return Err(RuntimeError::AlreadyEnded(task_id.to_string()));
            }
            entry.cancel.cancel();
            entry.gate.reset();
        }
        warn!(task_id, "Task terminated by user");
        self.inner
            .set_status(task_id, TaskStatus::Terminated, None)
            .await;
        Ok(())
    }

    pub async fn status(&self, task_id: &str) -> Result<TaskInfo, RuntimeError> {
        self.inner
            .tasks
            .read()
            .await
            .get(task_id)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| RuntimeError::TaskNotFound(task_id.to_string()))
    }

    /// All tasks, oldest first.
    pub async fn list(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self
            .inner
            .tasks
            .read()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        tasks.sort_by_key(|info| info.created_at);
        tasks
    }

    /// The current plan of a flow task. `None` for agent tasks and for
    /// flows that have not stored a plan yet.
    pub async fn plan(&self, task_id: &str) -> Result<Option<Plan>, RuntimeError> {
        let Some(plan_id) = self.status(task_id).await?.plan_id else {
            return Ok(None);
        };
        match self.inner.plan_store.get(&plan_id).await {
            Ok(plan) => Ok(Some(plan)),
            Err(PlanError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Subscribe to a task's status.
    pub async fn watch(&self, task_id: &str) -> Result<watch::Receiver<TaskStatus>, RuntimeError> {
        self.inner
            .tasks
            .read()
            .await
            .get(task_id)
            .map(|entry| entry.status_tx.subscribe())
            .ok_or_else(|| RuntimeError::TaskNotFound(task_id.to_string()))
    }

    /// Wait until a task has ended and return its final record.
    pub async fn wait(&self, task_id: &str) -> Result<TaskInfo, RuntimeError> {
        let mut rx = self.watch(task_id).await?;
        // The sender lives as long as the entry, so this only fails if the
        // entry disappears; the record below reports what is left.
        let _ = rx.wait_for(TaskStatus::is_terminal).await;
        self.status(task_id).await
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("provider", &self.inner.provider.name())
            .field("plan_store", &self.inner.plan_store.name())
            .finish()
    }
}

async fn drive<R: Resumable>(
    inner: Arc<Inner>,
    task_id: String,
    mut runner: R,
    prompt: String,
    gate: Arc<AskHuman>,
    cancel: CancellationToken,
) {
    inner.set_status(&task_id, TaskStatus::Running, None).await;
    let mut outcome = runner.advance(&prompt).await;

    loop {
        match outcome {
            Outcome::Paused { question } => {
                inner
                    .set_status(&task_id, TaskStatus::WaitingForInput { question }, None)
                    .await;

                let answer = tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(task_id = %task_id, "Task terminated while waiting for input");
                        return;
                    }
                    answer = gate.await_response(inner.interaction_timeout()) => answer,
                };
                if answer == TIMEOUT_SENTINEL {
                    inner
                        .set_status(&task_id, TaskStatus::Failed { error: answer }, None)
                        .await;
                    return;
                }

                inner.set_status(&task_id, TaskStatus::Running, None).await;
                outcome = runner.advance(&answer).await;
            }
            Outcome::Completed(text) => {
                inner
                    .set_status(&task_id, TaskStatus::Completed, Some(text))
                    .await;
                return;
            }
            Outcome::Failed(text) => {
                inner
                    .set_status(
                        &task_id,
                        TaskStatus::Failed { error: text.clone() },
                        Some(text),
                    )
                    .await;
                return;
            }
            Outcome::Cancelled => {
                inner.set_status(&task_id, TaskStatus::Terminated, None).await;
                return;
            }
        }
    }
}
