//! # Stepwise Core
//!
//! Domain types, traits, and error definitions shared by every stepwise
//! crate: messages and memory, the provider and tool contracts, agent
//! state, run outcomes and domain events.
//!
//! Implementations live in their own crates; everything depends inward on
//! this one.

pub mod error;
pub mod message;
pub mod memory;
pub mod provider;
pub mod tool;
pub mod agent;
pub mod outcome;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, MessageToolCall, Role};
pub use memory::Memory;
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use agent::AgentState;
pub use outcome::{Outcome, INTERACTION_SENTINEL, TIMEOUT_SENTINEL};
pub use event::{DomainEvent, EventBus};
