//! Task hosting for stepwise.
//!
//! [`TaskManager`] runs agents and planning flows as background tasks,
//! tracks their status, relays operator answers to tasks that are waiting
//! for input and terminates tasks on request.

pub mod error;
pub mod manager;
pub mod task;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::RuntimeError;
pub use manager::TaskManager;
pub use task::{TaskInfo, TaskKind, TaskStatus};
