use std::collections::HashMap;

use client_core::{OperationSession, SessionId, StepStatus};
use shared::domain::StepId;

/// Turns successive board snapshots into the lines that changed since the
/// previous snapshot. Snapshots may be coalesced, so every step is compared.
#[derive(Debug, Default)]
pub struct BoardRenderer {
    session: Option<SessionId>,
    statuses: HashMap<StepId, StepStatus>,
    failures_shown: usize,
}

impl BoardRenderer {
    pub fn render(&mut self, session: Option<&OperationSession>) -> Vec<String> {
        let Some(session) = session else {
            self.reset(None);
            return Vec::new();
        };

        let mut lines = Vec::new();
        if self.session != Some(session.id()) {
            self.reset(Some(session.id()));
            lines.push(format!("== {} ==", session.operation().title));
        }

        let state = session.state();
        for step in &session.operation().steps {
            let status = state.step_status(&step.id);
            let previous = self.statuses.insert(step.id.clone(), status);
            if previous != Some(status) && status != StepStatus::Pending {
                lines.push(format!("  [{}] {}", marker(status), step.title));
            }
        }

        for failure in state.failed.iter().skip(self.failures_shown) {
            let title = session
                .operation()
                .step(&failure.step_id)
                .map_or(failure.step_id.as_str(), |step| step.title.as_str());
            lines.push(format!("      {title}: {}", failure.extra_details));
        }
        self.failures_shown = state.failed.len();

        lines
    }

    fn reset(&mut self, session: Option<SessionId>) {
        self.session = session;
        self.statuses.clear();
        self.failures_shown = 0;
    }
}

fn marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "  ",
        StepStatus::InProgress => "..",
        StepStatus::Completed => "ok",
        StepStatus::Failed => "!!",
    }
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
