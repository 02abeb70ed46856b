use super::*;

fn three_step_operation() -> Operation {
    Operation::new("install_sidestore", "Installing SideStore")
        .with_step("download", "Download SideStore")
        .with_step("install", "Sign & Install SideStore")
        .with_step("pairing", "Place Pairing File")
}

fn ids(values: &[&str]) -> Vec<StepId> {
    values.iter().map(|value| StepId::from(*value)).collect()
}

#[test]
fn started_then_finished_for_each_step_fills_both_logs_in_order() {
    let operation = three_step_operation();
    let mut state = OperationState::new(operation.clone());

    for step in &operation.steps {
        state = reduce(state, OperationUpdate::started(step.id.clone()));
        state = reduce(state, OperationUpdate::finished(step.id.clone()));
    }

    assert_eq!(state.started, ids(&["download", "install", "pairing"]));
    assert_eq!(state.completed, ids(&["download", "install", "pairing"]));
    assert!(state.failed.is_empty());
    assert!(state.all_steps_completed());
}

#[test]
fn failure_is_appended_without_touching_started() {
    let mut state = OperationState::new(three_step_operation());
    state.apply(OperationUpdate::started("install"));
    state.apply(OperationUpdate::failed("install", "Provisioning profile rejected"));

    assert_eq!(state.started, ids(&["install"]));
    assert_eq!(
        state.failed,
        vec![FailedStep {
            step_id: StepId::from("install"),
            extra_details: "Provisioning profile rejected".to_string(),
        }]
    );
}

#[test]
fn updates_keep_folding_after_a_failure() {
    let mut state = OperationState::new(three_step_operation());
    state.apply(OperationUpdate::started("download"));
    state.apply(OperationUpdate::failed("download", "mirror timed out"));
    state.apply(OperationUpdate::started("download"));
    state.apply(OperationUpdate::finished("download"));
    state.apply(OperationUpdate::started("install"));

    assert_eq!(state.started, ids(&["download", "download", "install"]));
    assert_eq!(state.completed, ids(&["download"]));
    assert_eq!(state.failed.len(), 1);
}

#[test]
fn unknown_step_ids_are_recorded() {
    let mut state = OperationState::new(three_step_operation());
    state.apply(OperationUpdate::started("extract"));
    state.apply(OperationUpdate::finished("extract"));

    assert_eq!(state.started, ids(&["extract"]));
    assert_eq!(state.completed, ids(&["extract"]));
    assert!(!state.all_steps_completed());
}

#[test]
fn duplicate_updates_are_not_deduplicated() {
    let mut state = OperationState::new(three_step_operation());
    state.apply(OperationUpdate::finished("pairing"));
    state.apply(OperationUpdate::finished("pairing"));

    assert_eq!(state.completed, ids(&["pairing", "pairing"]));
}

#[test]
fn step_status_is_derived_from_log_membership() {
    let mut state = OperationState::new(three_step_operation());
    state.apply(OperationUpdate::started("download"));
    state.apply(OperationUpdate::finished("download"));
    state.apply(OperationUpdate::started("install"));
    state.apply(OperationUpdate::failed("install", "device locked"));

    assert_eq!(state.step_status(&"download".into()), StepStatus::Completed);
    assert_eq!(state.step_status(&"install".into()), StepStatus::Failed);
    assert_eq!(state.step_status(&"pairing".into()), StepStatus::Pending);

    state.apply(OperationUpdate::started("pairing"));
    assert_eq!(state.step_status(&"pairing".into()), StepStatus::InProgress);

    let install = StepId::from("install");
    let details: Vec<_> = state
        .failures_for(&install)
        .map(|failure| failure.extra_details.as_str())
        .collect();
    assert_eq!(details, vec!["device locked"]);
}

#[test]
fn step_status_follows_the_latest_update() {
    let mut state = OperationState::new(three_step_operation());
    let install = StepId::from("install");

    state.apply(OperationUpdate::started("install"));
    state.apply(OperationUpdate::failed("install", "device locked"));
    assert_eq!(state.step_status(&install), StepStatus::Failed);

    state.apply(OperationUpdate::started("install"));
    assert_eq!(state.step_status(&install), StepStatus::InProgress);

    state.apply(OperationUpdate::finished("install"));
    assert_eq!(state.step_status(&install), StepStatus::Completed);
    assert_eq!(state.failures_for(&install).count(), 1);
    assert_eq!(state.started, ids(&["install", "install"]));
}

#[test]
fn failure_after_finish_reads_as_failed() {
    let mut state = OperationState::new(three_step_operation());
    state.apply(OperationUpdate::started("pairing"));
    state.apply(OperationUpdate::finished("pairing"));
    state.apply(OperationUpdate::failed("pairing", "pairing file rejected"));

    assert_eq!(state.step_status(&"pairing".into()), StepStatus::Failed);
}
