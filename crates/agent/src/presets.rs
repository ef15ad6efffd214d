//! Ready-made agent configurations.

use std::sync::Arc;

use stepwise_config::AppConfig;
use stepwise_core::provider::Provider;
use stepwise_core::tool::ToolRegistry;

use crate::agent::{Agent, ModelSettings};
use crate::prompts;

pub const GENERAL_AGENT_NAME: &str = "stepwise";
pub const FLOW_AGENT_NAME: &str = "flow";

/// Model settings taken from the config file.
pub fn model_settings(config: &AppConfig) -> ModelSettings {
    ModelSettings {
        model: config.model.clone(),
        temperature: config.temperature,
        max_tokens: Some(config.max_tokens),
    }
}

/// The general-purpose agent that handles a whole task on its own.
pub fn general_agent(config: &AppConfig, provider: Arc<dyn Provider>, tools: ToolRegistry) -> Agent {
    Agent::new(GENERAL_AGENT_NAME, provider, model_settings(config))
        .with_description("A versatile agent that can solve various tasks using multiple tools")
        .with_tools(tools)
        .with_max_steps(config.agent.max_steps)
        .with_duplicate_threshold(config.agent.duplicate_threshold)
        .with_max_observe(config.agent.max_observe)
        .with_workspace_root(&config.workspace_root)
}

/// An executor for planning flows. It works one plan step per run and
/// gets a smaller step budget.
pub fn flow_step_agent(config: &AppConfig, provider: Arc<dyn Provider>, tools: ToolRegistry) -> Agent {
    Agent::new(FLOW_AGENT_NAME, provider, model_settings(config))
        .with_description("Executes a single step of a plan")
        .with_system_prompt(prompts::FLOW_STEP_SYSTEM_PROMPT)
        .with_next_step_prompt(prompts::FLOW_STEP_NEXT_STEP_PROMPT)
        .with_tools(tools)
        .with_max_steps(config.flow.executor_max_steps)
        .with_duplicate_threshold(config.agent.duplicate_threshold)
        .with_max_observe(config.agent.max_observe)
        .with_workspace_root(&config.workspace_root)
}
