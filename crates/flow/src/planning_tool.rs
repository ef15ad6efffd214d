//! The `planning` tool: plan store operations exposed to the model.
//!
//! The planning flow advertises this tool's schema when it asks the model
//! for a plan, parses the model's `create` call with
//! [`PlanningCommand::parse`] and stores the plan through
//! [`PlanningTool::create`]. The same tool instance is registered with the
//! flow's executors, with the flow's plan active, so they can read the plan
//! and annotate its steps.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use stepwise_core::error::{PlanError, ToolError};
use stepwise_core::tool::{Tool, ToolResult};
use tracing::info;

use crate::plan::{Plan, StepStatus};
use crate::store::PlanStore;

pub const PLANNING_TOOL: &str = "planning";

const COMMANDS: [&str; 5] = ["create", "get", "get_step", "mark_step", "list"];

/// A parsed `planning` tool call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PlanningCommand {
    Create {
        #[serde(default)]
        plan_id: Option<String>,
        #[serde(default)]
        title: String,
        steps: Vec<String>,
        #[serde(default)]
        request: String,
    },
    Get {
        #[serde(default)]
        plan_id: Option<String>,
    },
    GetStep {
        #[serde(default)]
        plan_id: Option<String>,
        #[serde(default)]
        step_index: Option<usize>,
    },
    MarkStep {
        #[serde(default)]
        plan_id: Option<String>,
        step_index: usize,
        #[serde(default)]
        step_status: Option<StepStatus>,
        #[serde(default)]
        step_notes: Option<String>,
    },
    List,
}

impl PlanningCommand {
    pub fn parse(arguments: serde_json::Value) -> Result<Self, ToolError> {
        match arguments.get("command").and_then(|c| c.as_str()) {
            Some(command) if COMMANDS.contains(&command) => {}
            Some(other) => return Err(PlanError::InvalidCommand(other.to_string()).into()),
            None => return Err(ToolError::InvalidArguments("Missing 'command' argument".into())),
        }
        serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid planning arguments: {e}")))
    }

    /// Turn a `create` command into a plan. Other commands give `None`.
    pub fn into_plan(self) -> Option<Result<Plan, ToolError>> {
        let PlanningCommand::Create {
            plan_id,
            title,
            steps,
            request,
        } = self
        else {
            return None;
        };
        let Some(plan_id) = plan_id.filter(|id| !id.is_empty()) else {
            return Some(Err(ToolError::InvalidArguments(
                "'plan_id' is required for create".into(),
            )));
        };
        let steps: Vec<String> = steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if steps.is_empty() {
            return Some(Err(ToolError::InvalidArguments(
                "'steps' must be a non-empty list of strings".into(),
            )));
        }
        let title = if title.trim().is_empty() {
            Plan::fallback(plan_id.as_str(), &request).title
        } else {
            title
        };
        Some(Ok(Plan::new(plan_id, title, request, steps)))
    }
}

/// Plan management tool backed by a [`PlanStore`].
pub struct PlanningTool {
    store: Arc<dyn PlanStore>,
    active_plan: Mutex<Option<String>>,
}

impl PlanningTool {
    pub fn new(store: Arc<dyn PlanStore>) -> Self {
        Self {
            store,
            active_plan: Mutex::new(None),
        }
    }

    fn active(&self) -> Option<String> {
        self.active_plan
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Make `plan_id` the default for commands that omit it.
    pub fn set_active(&self, plan_id: &str) {
        *self
            .active_plan
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(plan_id.to_string());
    }

    fn resolve_id(&self, plan_id: Option<String>) -> Result<String, ToolError> {
        plan_id
            .filter(|id| !id.is_empty())
            .or_else(|| self.active())
            .ok_or_else(|| {
                ToolError::InvalidArguments("No plan_id given and no active plan".into())
            })
    }

    /// Store a new plan and make it the active one.
    pub async fn create(&self, plan: Plan) -> Result<Plan, PlanError> {
        let plan = self.store.create(plan).await?;
        self.set_active(&plan.plan_id);
        info!(plan_id = %plan.plan_id, steps = plan.len(), "Plan created");
        Ok(plan)
    }

    /// Run a parsed command and return the text shown to the model.
    pub async fn run(&self, command: PlanningCommand) -> Result<String, ToolError> {
        match command {
            create @ PlanningCommand::Create { .. } => {
                let plan = match create.into_plan() {
                    Some(plan) => plan?,
                    None => return Err(PlanError::InvalidCommand("create".into()).into()),
                };
                let plan = self.create(plan).await?;
                Ok(format!(
                    "Plan created successfully with ID: {}\n\n{}",
                    plan.plan_id,
                    plan.render()
                ))
            }
            PlanningCommand::Get { plan_id } => {
                let plan = self.store.get(&self.resolve_id(plan_id)?).await?;
                Ok(plan.render())
            }
            PlanningCommand::GetStep {
                plan_id,
                step_index,
            } => {
                let plan_id = self.resolve_id(plan_id)?;
                let index = match step_index {
                    Some(index) => index,
                    None => match self.store.get(&plan_id).await?.first_active() {
                        Some((index, _)) => index,
                        None => return Ok(format!("All steps of plan '{plan_id}' are done.")),
                    },
                };
                let step = self.store.get_step(&plan_id, index).await?;
                let mut out = format!("Step {index}: {} {}", step.status.mark(), step.text);
                if !step.notes.is_empty() {
                    out.push_str(&format!("\nNotes: {}", step.notes));
                }
                Ok(out)
            }
            PlanningCommand::MarkStep {
                plan_id,
                step_index,
                step_status,
                step_notes,
            } => {
                let plan_id = self.resolve_id(plan_id)?;
                let plan = self
                    .store
                    .mark_step(&plan_id, step_index, step_status, step_notes)
                    .await?;
                Ok(format!(
                    "Step {step_index} updated in plan '{plan_id}'.\n\n{}",
                    plan.render()
                ))
            }
            PlanningCommand::List => {
                let plans = self.store.list().await?;
                if plans.is_empty() {
                    return Ok("No plans available. Create a plan with the 'create' command.".into());
                }
                let active = self.active();
                let mut out = String::from("Available plans:\n");
                for plan in plans {
                    let marker = if active.as_deref() == Some(plan.plan_id.as_str()) {
                        " (active)"
                    } else {
                        ""
                    };
                    out.push_str(&format!(
                        "• {}{marker}: {} - {}/{} steps completed\n",
                        plan.plan_id,
                        plan.title,
                        plan.status_counts().completed,
                        plan.len()
                    ));
                }
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl Tool for PlanningTool {
    fn name(&self) -> &str {
        PLANNING_TOOL
    }

    fn description(&self) -> &str {
        "A planning tool that allows the agent to create and manage plans for solving complex tasks. \
         The tool provides functionality for creating plans, reading plans and steps, and updating step status."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "description": "The command to execute.",
                    "enum": COMMANDS,
                    "type": "string"
                },
                "plan_id": {
                    "description": "Unique identifier for the plan. Required for create; other commands default to the active plan.",
                    "type": "string"
                },
                "title": {
                    "description": "Title for the plan. Required for create.",
                    "type": "string"
                },
                "request": {
                    "description": "The original request the plan answers. Used by create.",
                    "type": "string"
                },
                "steps": {
                    "description": "List of plan steps. Required for create.",
                    "type": "array",
                    "items": { "type": "string" }
                },
                "step_index": {
                    "description": "Index of the step (0-based). Required for mark_step.",
                    "type": "integer"
                },
                "step_status": {
                    "description": "Status to set for a step. Used with mark_step.",
                    "enum": ["not_started", "in_progress", "completed", "blocked"],
                    "type": "string"
                },
                "step_notes": {
                    "description": "Additional notes for a step. Used with mark_step.",
                    "type": "string"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = PlanningCommand::parse(arguments)?;
        Ok(ToolResult::ok(self.run(command).await?))
    }
}
