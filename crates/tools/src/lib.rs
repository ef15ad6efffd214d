//! Built-in tool implementations for stepwise.
//!
//! `ask_human` is the human-interaction gate, `terminate` ends a run and
//! `shell` runs commands inside the workspace.

pub mod ask_human;
pub mod shell;
pub mod terminate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stepwise_core::tool::ToolRegistry;

pub use ask_human::{AskHuman, ASK_HUMAN_TOOL};
pub use shell::ShellTool;
pub use terminate::{TerminateTool, TERMINATE_TOOL};

/// Options for [`default_registry`].
#[derive(Debug, Clone)]
pub struct ToolOptions {
    pub workspace_root: PathBuf,
    pub shell_enabled: bool,
    pub shell_timeout: Duration,
}

/// Create a tool registry with the built-in tools and the given gate.
///
/// The gate is passed in because it belongs to a single task.
pub fn default_registry(options: &ToolOptions, gate: Arc<AskHuman>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    if options.shell_enabled {
        registry.register(Arc::new(
            ShellTool::new(vec![])
                .with_workdir(&options.workspace_root)
                .with_timeout(options.shell_timeout),
        ));
    }
    registry.register(gate);
    registry.register(Arc::new(TerminateTool));
    registry
}
