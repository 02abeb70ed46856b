use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use bridge::{Backend, EventChannel, InvokeParams};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::OperationId,
    error::BackendError,
    protocol::operation_procedure_name,
};
use tracing::{debug, warn};

use crate::progress::ProgressReporter;

#[async_trait]
pub trait Procedure: Send + Sync {
    async fn call(&self, params: InvokeParams) -> Result<Value, BackendError>;
}

#[async_trait]
impl<F, Fut> Procedure for F
where
    F: Fn(InvokeParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, BackendError>> + Send,
{
    async fn call(&self, params: InvokeParams) -> Result<Value, BackendError> {
        (self)(params).await
    }
}

/// A long-running procedure that reports step progress while it runs.
#[async_trait]
pub trait OperationProcedure: Send + Sync {
    async fn run(
        &self,
        progress: &ProgressReporter,
        params: InvokeParams,
    ) -> Result<Value, BackendError>;
}

struct OperationEntry {
    operation_id: OperationId,
    events: Arc<dyn EventChannel>,
    procedure: Arc<dyn OperationProcedure>,
}

#[async_trait]
impl Procedure for OperationEntry {
    async fn call(&self, params: InvokeParams) -> Result<Value, BackendError> {
        let progress = ProgressReporter::new(Arc::clone(&self.events), &self.operation_id);
        self.procedure.run(&progress, params).await
    }
}

pub fn parse_params<T: DeserializeOwned>(params: InvokeParams) -> Result<T, BackendError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|error| BackendError::new(format!("invalid params: {error}")))
}

pub struct ProcedureRouter {
    events: Arc<dyn EventChannel>,
    procedures: HashMap<String, Arc<dyn Procedure>>,
}

impl ProcedureRouter {
    pub fn new(events: Arc<dyn EventChannel>) -> Self {
        Self {
            events,
            procedures: HashMap::new(),
        }
    }

    pub fn events(&self) -> &Arc<dyn EventChannel> {
        &self.events
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        procedure: impl Procedure + 'static,
    ) -> &mut Self {
        let name = name.into();
        if self
            .procedures
            .insert(name.clone(), Arc::new(procedure))
            .is_some()
        {
            warn!(procedure = %name, "replaced previously registered procedure");
        }
        self
    }

    /// Registers `procedure` under `<operation_id>_operation`, reporting on
    /// `operation_<operation_id>`.
    pub fn register_operation(
        &mut self,
        operation_id: impl Into<OperationId>,
        procedure: impl OperationProcedure + 'static,
    ) -> &mut Self {
        let operation_id = operation_id.into();
        let name = operation_procedure_name(&operation_id);
        let entry = OperationEntry {
            operation_id,
            events: Arc::clone(&self.events),
            procedure: Arc::new(procedure),
        };
        self.register(name, entry)
    }

    pub fn procedure_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.procedures.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl Backend for ProcedureRouter {
    async fn invoke(&self, procedure: &str, params: InvokeParams) -> Result<Value, BackendError> {
        let Some(handler) = self.procedures.get(procedure).cloned() else {
            warn!(procedure, "invoked unknown procedure");
            return Err(BackendError::new(format!("unknown procedure: {procedure}")));
        };

        debug!(procedure, "procedure started");
        let result = handler.call(params).await;
        match &result {
            Ok(_) => debug!(procedure, "procedure finished"),
            Err(error) => warn!(procedure, %error, "procedure failed"),
        }
        result
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
