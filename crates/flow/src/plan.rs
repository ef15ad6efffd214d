//! Plan model.
//!
//! A plan is an ordered list of steps, each carrying its own status and
//! notes, so step count, status count and note count can never drift apart.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use stepwise_core::error::PlanError;

/// Progress of a single plan step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl StepStatus {
    pub const ALL: [StepStatus; 4] = [
        StepStatus::NotStarted,
        StepStatus::InProgress,
        StepStatus::Completed,
        StepStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::NotStarted => "not_started",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Blocked => "blocked",
        }
    }

    /// Active steps are the ones a flow still has to work on.
    pub fn is_active(&self) -> bool {
        matches!(self, StepStatus::NotStarted | StepStatus::InProgress)
    }

    /// Checkbox-style marker used in rendered plans.
    pub fn mark(&self) -> &'static str {
        match self {
            StepStatus::NotStarted => "[ ]",
            StepStatus::InProgress => "[→]",
            StepStatus::Completed => "[✓]",
            StepStatus::Blocked => "[!]",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PlanError::InvalidStatus(s.to_string()))
    }
}

/// One step of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub text: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub notes: String,
}

impl Step {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: StepStatus::NotStarted,
            notes: String::new(),
        }
    }

    /// The executor tag at the end of the step text, lowercased.
    ///
    /// A tag is a bracketed token of letters, digits, `_` or `-` that
    /// closes the text: `"Collect sources [SEARCH]"` gives `"search"`.
    pub fn executor_tag(&self) -> Option<String> {
        let text = self.text.trim_end();
        let inner = text.strip_suffix(']')?;
        let open = inner.rfind('[')?;
        let tag = &inner[open + 1..];
        let valid = !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| tag.to_ascii_lowercase())
    }
}

/// Per-status step counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub not_started: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
}

/// A titled, ordered list of steps created for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub title: String,
    #[serde(default)]
    pub request: String,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new<S: Into<String>>(
        plan_id: impl Into<String>,
        title: impl Into<String>,
        request: impl Into<String>,
        steps: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            title: title.into(),
            request: request.into(),
            steps: steps.into_iter().map(Step::new).collect(),
        }
    }

    /// The plan used when the model does not produce one.
    pub fn fallback(plan_id: impl Into<String>, request: &str) -> Self {
        let mut title: String = request.chars().take(50).collect();
        if request.chars().count() > 50 {
            title.push_str("...");
        }
        Self::new(
            plan_id,
            format!("Plan for: {title}"),
            request,
            ["Analyze request", "Execute task", "Verify results"],
        )
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Mutable access to step `index`, padding with empty not-started
    /// steps when the plan is shorter.
    pub fn ensure_step(&mut self, index: usize) -> &mut Step {
        if index >= self.steps.len() {
            self.steps.resize_with(index + 1, Step::default);
        }
        &mut self.steps[index]
    }

    /// Update a step in place. An index past the last step pads the plan
    /// with `not_started` steps first.
    pub fn mark_step(
        &mut self,
        index: usize,
        status: Option<StepStatus>,
        notes: Option<String>,
    ) -> &Step {
        let step = self.ensure_step(index);
        if let Some(status) = status {
            step.status = status;
        }
        if let Some(notes) = notes {
            step.notes = notes;
        }
        step
    }

    /// The first step still to be worked on, scanning in order.
    pub fn first_active(&self) -> Option<(usize, &Step)> {
        self.steps
            .iter()
            .enumerate()
            .find(|(_, step)| step.status.is_active())
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for step in &self.steps {
            match step.status {
                StepStatus::NotStarted => counts.not_started += 1,
                StepStatus::InProgress => counts.in_progress += 1,
                StepStatus::Completed => counts.completed += 1,
                StepStatus::Blocked => counts.blocked += 1,
            }
        }
        counts
    }

    /// One `text: status: notes` line per step up to and including `upto`.
    pub fn transcript(&self, upto: usize) -> String {
        self.steps
            .iter()
            .take(upto.saturating_add(1))
            .map(|step| format!("{}: {}: {}\n", step.text, step.status, step.notes))
            .collect()
    }

    /// Instruction handed to an executor starting step `index`.
    pub fn step_prompt(&self, index: usize) -> String {
        let step = self.steps.get(index).map(|s| s.text.as_str()).unwrap_or_default();
        format!(
            "There is a plan flow containing a couple of steps to finish the request about '{}'. \
             Now you are on the step about '{}', and only concentrate on it. ",
            self.request, step
        )
    }

    /// Human-readable rendering with progress and per-step marks.
    pub fn render(&self) -> String {
        let mut header = format!("Plan: {} (ID: {})\n", self.title, self.plan_id);
        if !self.request.is_empty() {
            header.push_str(&format!("Original request: {}\n", self.request));
        }
        let rule = "=".repeat(header.chars().count());

        let counts = self.status_counts();
        let total = self.steps.len();
        let progress = if total > 0 {
            format!("({:.1}%)", counts.completed as f64 / total as f64 * 100.0)
        } else {
            "(0%)".to_string()
        };

        let mut out = format!("{header}{rule}\n\n");
        out.push_str(&format!(
            "Progress: {}/{total} steps completed {progress}\n",
            counts.completed
        ));
        out.push_str(&format!(
            "Status: {} completed, {} in progress, {} blocked, {} not started\n\n",
            counts.completed, counts.in_progress, counts.blocked, counts.not_started
        ));
        out.push_str("Steps:\n");
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("{i}. {} {}\n", step.status.mark(), step.text));
            if !step.notes.is_empty() {
                out.push_str(&format!("   Notes: {}\n", step.notes));
            }
        }
        out
    }
}
