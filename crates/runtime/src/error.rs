use stepwise_core::error::PlanError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Prompt is required")]
    EmptyPrompt,

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task '{0}' is not waiting for input")]
    NotWaiting(String),

    #[error("Task '{0}' has already ended")]
    AlreadyEnded(String),

    #[error(transparent)]
    Plan(#[from] PlanError),
}
