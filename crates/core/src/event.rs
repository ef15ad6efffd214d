//! Domain event system: decoupled progress reporting.
//!
//! Agents and flows publish events when something interesting happens;
//! the runtime and the CLI subscribe to render progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An agent began a think/act iteration
    AgentStepStarted {
        agent: String,
        step: usize,
        max_steps: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        agent: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Duplicate think outputs triggered stuck handling
    StuckDetected {
        agent: String,
        step: usize,
        timestamp: DateTime<Utc>,
    },

    /// A run paused to ask the operator something
    InteractionRequired {
        agent: String,
        question: String,
        timestamp: DateTime<Utc>,
    },

    /// A flow stored a new plan
    PlanCreated {
        plan_id: String,
        title: String,
        steps: usize,
        timestamp: DateTime<Utc>,
    },

    /// A plan step changed status
    PlanStepUpdated {
        plan_id: String,
        step_index: usize,
        status: String,
        timestamp: DateTime<Utc>,
    },

    /// A hosted task changed status
    TaskStatusChanged {
        task_id: String,
        status: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
