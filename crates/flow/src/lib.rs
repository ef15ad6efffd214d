//! Planning flows for stepwise.
//!
//! A [`PlanningFlow`] asks the model for a plan, stores it in a
//! [`PlanStore`] and runs each step with an executor [`Agent`], strictly in
//! order. A step whose executor asks the operator a question pauses the
//! whole flow; calling [`PlanningFlow::execute`] again with the answer
//! resumes it.
//!
//! [`Agent`]: stepwise_agent::Agent

pub mod controller;
pub mod file_store;
pub mod plan;
pub mod planning_tool;
pub mod prompts;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

use stepwise_config::{AppConfig, PlanStoreKind};

pub use controller::{PlanningFlow, EMPTY_INPUT_MESSAGE};
pub use file_store::FilePlanStore;
pub use plan::{Plan, StatusCounts, Step, StepStatus};
pub use planning_tool::{PlanningCommand, PlanningTool, PLANNING_TOOL};
pub use store::{InMemoryPlanStore, PlanStore};

/// Build the plan store selected in the config.
pub fn store_from_config(config: &AppConfig) -> Arc<dyn PlanStore> {
    match config.flow.plan_store {
        PlanStoreKind::Memory => Arc::new(InMemoryPlanStore::new()),
        PlanStoreKind::File => Arc::new(FilePlanStore::new(&config.flow.plan_dir)),
    }
}
