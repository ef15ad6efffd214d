//! The agent step loop for stepwise.
//!
//! An agent alternates **think** (ask the model what to do next) and
//! **act** (run the tools it picked) until one of these happens:
//!
//! 1. a finishing tool such as `terminate` succeeds,
//! 2. the step budget runs out,
//! 3. the model or the loop fails,
//! 4. a tool asks the operator a question (the run pauses),
//! 5. the run is cancelled.
//!
//! Runs that end in the first three ways close with a model-written
//! summary of the task.

pub mod agent;
pub mod presets;
pub mod prompts;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{Agent, ModelSettings, Thought};
pub use presets::{flow_step_agent, general_agent, model_settings};
