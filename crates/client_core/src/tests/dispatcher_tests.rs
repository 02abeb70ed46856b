use super::*;
use async_trait::async_trait;
use bridge::LocalEventBus;
use serde_json::json;
use shared::domain::StepId;
use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};
use tokio::sync::Notify;

#[derive(Clone)]
struct Script {
    gate: Option<Arc<Notify>>,
    updates: Vec<Value>,
    result: Result<Value, BackendError>,
    panic: bool,
}

impl Script {
    fn resolves(updates: Vec<Value>) -> Self {
        Self {
            gate: None,
            updates,
            result: Ok(Value::Null),
            panic: false,
        }
    }

    fn rejects(updates: Vec<Value>, error: &str) -> Self {
        Self {
            result: Err(BackendError::new(error)),
            ..Self::resolves(updates)
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[derive(Debug, Clone)]
struct RecordedCall {
    procedure: String,
    params: InvokeParams,
    listeners_at_invoke: usize,
}

struct ScriptedBackend {
    bus: LocalEventBus,
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    fn new(bus: LocalEventBus) -> Self {
        Self {
            bus,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn script(self, procedure: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .expect("scripts")
            .insert(procedure.to_string(), script);
        self
    }

    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls").clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn invoke(&self, procedure: &str, params: InvokeParams) -> Result<Value, BackendError> {
        let channel = procedure
            .strip_suffix("_operation")
            .map(|id| format!("operation_{id}"))
            .unwrap_or_default();
        self.calls.lock().expect("calls").push(RecordedCall {
            procedure: procedure.to_string(),
            params,
            listeners_at_invoke: self.bus.subscriber_count(&channel),
        });

        let script = self
            .scripts
            .lock()
            .expect("scripts")
            .get(procedure)
            .cloned()
            .ok_or_else(|| BackendError::new(format!("unknown procedure: {procedure}")))?;

        if let Some(gate) = &script.gate {
            gate.notified().await;
        }
        if script.panic {
            panic!("backend crashed while running {procedure}");
        }
        for update in script.updates {
            self.bus
                .publish(&channel, update)
                .await
                .map_err(|error| BackendError::new(error.to_string()))?;
        }
        script.result
    }
}

fn sideload() -> Operation {
    Operation::new("sideload", "Installing App").with_step("install", "Sign & Install App")
}

fn install_sidestore() -> Operation {
    Operation::new("install_sidestore", "Installing SideStore")
        .with_step("download", "Download SideStore")
        .with_step("install", "Sign & Install SideStore")
        .with_step("pairing", "Place Pairing File")
}

fn started(step: &str) -> Value {
    json!({"updateType": "started", "stepId": step})
}

fn finished(step: &str) -> Value {
    json!({"updateType": "finished", "stepId": step})
}

fn failed(step: &str, details: &str) -> Value {
    json!({"updateType": "failed", "stepId": step, "extraDetails": details})
}

fn ids(values: &[&str]) -> Vec<StepId> {
    values.iter().map(|value| StepId::from(*value)).collect()
}

fn dispatcher_for(bus: &LocalEventBus, backend: Arc<ScriptedBackend>) -> Arc<OperationDispatcher> {
    Arc::new(OperationDispatcher::new(
        Arc::new(bus.clone()),
        backend,
        Arc::new(OperationBoard::new()),
    ))
}

async fn wait_for_calls(backend: &ScriptedBackend, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while backend.calls().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("backend was not invoked in time");
}

#[tokio::test]
async fn resolved_invocation_folds_started_and_finished() {
    let bus = LocalEventBus::new();
    let backend = Arc::new(
        ScriptedBackend::new(bus.clone()).script(
            "sideload_operation",
            Script::resolves(vec![started("install"), finished("install")]),
        ),
    );
    let dispatcher = dispatcher_for(&bus, backend.clone());

    let outcome = dispatcher.dispatch_tracked(sideload(), InvokeParams::new()).await;

    outcome.result.expect("dispatch resolves");
    let state = outcome.session.state();
    assert_eq!(state.started, ids(&["install"]));
    assert_eq!(state.completed, ids(&["install"]));
    assert!(state.failed.is_empty());

    let visible = dispatcher.board().current().expect("visible session");
    assert_eq!(visible.id(), outcome.session.id());
    assert_eq!(visible.state(), state);
    assert_eq!(bus.subscriber_count("operation_sideload"), 0);
}

#[tokio::test]
async fn rejected_invocation_keeps_partial_progress_and_error() {
    let bus = LocalEventBus::new();
    let backend = Arc::new(ScriptedBackend::new(bus.clone()).script(
        "sideload_operation",
        Script::rejects(vec![started("install")], "device disconnected"),
    ));
    let dispatcher = dispatcher_for(&bus, backend);

    let outcome = dispatcher.dispatch_tracked(sideload(), InvokeParams::new()).await;

    let err = outcome.result.expect_err("dispatch rejects");
    assert_eq!(
        err.backend_error(),
        Some(&BackendError::new("device disconnected"))
    );
    assert_eq!(err.to_string(), "device disconnected");
    let state = outcome.session.state();
    assert_eq!(state.started, ids(&["install"]));
    assert!(state.completed.is_empty());
    assert!(state.failed.is_empty());
}

#[tokio::test]
async fn updates_after_settlement_are_not_applied() {
    let bus = LocalEventBus::new();
    let backend = Arc::new(ScriptedBackend::new(bus.clone()).script(
        "sideload_operation",
        Script::rejects(vec![started("install")], "device disconnected"),
    ));
    let dispatcher = dispatcher_for(&bus, backend);

    let result = dispatcher.dispatch(sideload(), InvokeParams::new()).await;
    assert!(result.is_err());

    let delivered = bus
        .publish("operation_sideload", finished("install"))
        .await
        .expect("publish");
    assert_eq!(delivered, 0);

    let visible = dispatcher.board().current().expect("visible session");
    assert_eq!(visible.state().started, ids(&["install"]));
    assert!(visible.state().completed.is_empty());
}

#[tokio::test]
async fn listener_is_attached_before_backend_runs() {
    let bus = LocalEventBus::new();
    let backend = Arc::new(
        ScriptedBackend::new(bus.clone())
            .script("install_sidestore_operation", Script::resolves(Vec::new())),
    );
    let dispatcher = dispatcher_for(&bus, backend.clone());

    let mut params = InvokeParams::new();
    params.insert("nightly".into(), json!(true));
    params.insert("liveContainer".into(), json!(false));
    dispatcher
        .dispatch(install_sidestore(), params)
        .await
        .expect("dispatch");

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].procedure, "install_sidestore_operation");
    assert_eq!(calls[0].listeners_at_invoke, 1);
    assert_eq!(
        Value::Object(calls[0].params.clone()),
        json!({"nightly": true, "liveContainer": false})
    );
}

#[tokio::test]
async fn subscription_failure_never_invokes_backend() {
    let bus = LocalEventBus::new();
    let backend = Arc::new(ScriptedBackend::new(bus.clone()));
    let dispatcher = dispatcher_for(&bus, backend.clone());

    let operation = Operation::new("side load", "Installing App");
    let err = dispatcher
        .dispatch(operation, InvokeParams::new())
        .await
        .expect_err("invalid channel");

    assert!(matches!(
        err,
        DispatchError::Subscription {
            ref channel,
            source: ChannelError::InvalidName(_),
        } if channel == "operation_side load"
    ));
    assert!(err.backend_error().is_none());
    assert!(backend.calls().is_empty());
    assert!(dispatcher.board().current().is_none());
}

#[tokio::test]
async fn closed_bus_rejects_before_invocation() {
    let bus = LocalEventBus::new();
    bus.close();
    let backend = Arc::new(
        ScriptedBackend::new(bus.clone()).script("sideload_operation", Script::resolves(Vec::new())),
    );
    let dispatcher = dispatcher_for(&bus, backend.clone());

    let err = dispatcher
        .dispatch(sideload(), InvokeParams::new())
        .await
        .expect_err("bus closed");

    assert!(matches!(
        err,
        DispatchError::Subscription {
            source: ChannelError::Closed,
            ..
        }
    ));
    assert!(backend.calls().is_empty());
    assert!(dispatcher.board().current().is_none());
}

#[tokio::test]
async fn step_failure_does_not_fail_the_dispatch() {
    let bus = LocalEventBus::new();
    let backend = Arc::new(ScriptedBackend::new(bus.clone()).script(
        "install_sidestore_operation",
        Script::resolves(vec![
            started("download"),
            failed("download", "mirror unavailable, retrying"),
            started("download"),
            finished("download"),
        ]),
    ));
    let dispatcher = dispatcher_for(&bus, backend);

    let outcome = dispatcher
        .dispatch_tracked(install_sidestore(), InvokeParams::new())
        .await;

    outcome.result.expect("invocation resolved");
    let state = outcome.session.state();
    assert_eq!(state.started, ids(&["download", "download"]));
    assert_eq!(state.completed, ids(&["download"]));
    assert_eq!(state.failed.len(), 1);
    assert_eq!(state.failed[0].extra_details, "mirror unavailable, retrying");
}

#[tokio::test]
async fn malformed_progress_payloads_are_skipped() {
    let bus = LocalEventBus::new();
    let backend = Arc::new(ScriptedBackend::new(bus.clone()).script(
        "sideload_operation",
        Script::resolves(vec![
            json!("not an update"),
            json!({"updateType": "paused", "stepId": "install"}),
            started("install"),
        ]),
    ));
    let dispatcher = dispatcher_for(&bus, backend);

    let outcome = dispatcher.dispatch_tracked(sideload(), InvokeParams::new()).await;

    outcome.result.expect("dispatch resolves");
    assert_eq!(outcome.session.state().started, ids(&["install"]));
}

#[tokio::test]
async fn second_dispatch_replaces_view_without_cancelling_first() {
    let bus = LocalEventBus::new();
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(
        ScriptedBackend::new(bus.clone())
            .script(
                "install_sidestore_operation",
                Script::resolves(vec![started("download"), finished("download")])
                    .gated(gate.clone()),
            )
            .script(
                "sideload_operation",
                Script::resolves(vec![started("install")]),
            ),
    );
    let dispatcher = dispatcher_for(&bus, backend.clone());

    let first = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch_tracked(install_sidestore(), InvokeParams::new())
                .await
        })
    };
    wait_for_calls(&backend, 1).await;

    let second = dispatcher
        .dispatch_tracked(sideload(), InvokeParams::new())
        .await;
    second.result.expect("second resolves");
    assert_eq!(dispatcher.board().current_id(), Some(second.session.id()));

    gate.notify_one();
    let first = first.await.expect("first task");
    first.result.expect("first still resolves");
    assert_eq!(first.session.state().completed, ids(&["download"]));

    let visible = dispatcher.board().current().expect("visible session");
    assert_eq!(visible.id(), second.session.id());
    assert_eq!(visible.state().started, ids(&["install"]));
}

#[tokio::test]
async fn listener_is_released_when_backend_panics() {
    let bus = LocalEventBus::new();
    let backend = Arc::new(ScriptedBackend::new(bus.clone()).script(
        "sideload_operation",
        Script {
            panic: true,
            ..Script::resolves(Vec::new())
        },
    ));
    let dispatcher = dispatcher_for(&bus, backend);

    let handle = tokio::spawn(async move {
        dispatcher
            .dispatch(sideload(), InvokeParams::new())
            .await
    });
    let join_error = handle.await.expect_err("dispatch task panicked");

    assert!(join_error.is_panic());
    assert_eq!(bus.subscriber_count("operation_sideload"), 0);
}
