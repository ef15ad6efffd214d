//! Agent lifecycle state.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::StateError;

/// Lifecycle state of a single agent.
///
/// `Running` and `Error` only exist while an operation is in progress;
/// once `run` returns an agent is either `Idle` or `Finished`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    #[default]
    Idle,
    Running,
    Finished,
    Error,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "IDLE",
            AgentState::Running => "RUNNING",
            AgentState::Finished => "FINISHED",
            AgentState::Error => "ERROR",
        }
    }
}

impl FromStr for AgentState {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IDLE" => Ok(AgentState::Idle),
            "RUNNING" => Ok(AgentState::Running),
            "FINISHED" => Ok(AgentState::Finished),
            "ERROR" => Ok(AgentState::Error),
            _ => Err(StateError::InvalidState(s.to_string())),
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_state_starts_idle() {
        assert_eq!(AgentState::default(), AgentState::Idle);
    }

    #[test]
    fn parses_state_names_case_insensitively() {
        assert_eq!("finished".parse::<AgentState>().unwrap(), AgentState::Finished);
        assert_eq!("RUNNING".parse::<AgentState>().unwrap(), AgentState::Running);
    }

    #[test]
    fn rejects_unknown_state() {
        let err = "SLEEPING".parse::<AgentState>().unwrap_err();
        assert_eq!(err, StateError::InvalidState("SLEEPING".into()));
    }
}
