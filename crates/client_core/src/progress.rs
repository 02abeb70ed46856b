//! Folding of backend progress updates into a cumulative operation view.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shared::{
    domain::{Operation, StepId},
    protocol::OperationUpdate,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedStep {
    pub step_id: StepId,
    pub extra_details: String,
}

/// Cumulative progress of one operation run.
///
/// `started`, `completed` and `failed` are append-only logs in arrival order.
/// A step that finished appears in both `started` and `completed`; entries are
/// never removed or deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationState {
    pub current: Operation,
    pub started: Vec<StepId>,
    pub completed: Vec<StepId>,
    pub failed: Vec<FailedStep>,
    /// Status implied by the most recent update per step. Not part of the
    /// wire shape; a decoded state falls back to log membership.
    #[serde(skip)]
    latest: HashMap<StepId, StepStatus>,
}

/// Display status of a single step, derived from the three logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl OperationState {
    pub fn new(operation: Operation) -> Self {
        Self {
            current: operation,
            started: Vec::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            latest: HashMap::new(),
        }
    }

    /// Folds one update in place. Unknown step ids are recorded as-is.
    pub fn apply(&mut self, update: OperationUpdate) {
        match update {
            OperationUpdate::Started { step_id } => {
                self.latest.insert(step_id.clone(), StepStatus::InProgress);
                self.started.push(step_id);
            }
            OperationUpdate::Finished { step_id } => {
                self.latest.insert(step_id.clone(), StepStatus::Completed);
                self.completed.push(step_id);
            }
            OperationUpdate::Failed {
                step_id,
                extra_details,
            } => {
                self.latest.insert(step_id.clone(), StepStatus::Failed);
                self.failed.push(FailedStep {
                    step_id,
                    extra_details,
                });
            }
        }
    }

    /// The status the backend reported last for `step_id`, so a failed step
    /// that was retried and then finished reads as `Completed`.
    pub fn step_status(&self, step_id: &StepId) -> StepStatus {
        if let Some(status) = self.latest.get(step_id) {
            *status
        } else if self.failed.iter().any(|failure| &failure.step_id == step_id) {
            StepStatus::Failed
        } else if self.completed.contains(step_id) {
            StepStatus::Completed
        } else if self.started.contains(step_id) {
            StepStatus::InProgress
        } else {
            StepStatus::Pending
        }
    }

    pub fn failures_for<'a>(&'a self, step_id: &'a StepId) -> impl Iterator<Item = &'a FailedStep> {
        self.failed
            .iter()
            .filter(move |failure| &failure.step_id == step_id)
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// True once every declared step has a `Finished` entry.
    pub fn all_steps_completed(&self) -> bool {
        self.current
            .steps
            .iter()
            .all(|step| self.completed.contains(&step.id))
    }
}

pub fn reduce(mut state: OperationState, update: OperationUpdate) -> OperationState {
    state.apply(update);
    state
}

#[cfg(test)]
#[path = "tests/progress_tests.rs"]
mod tests;
