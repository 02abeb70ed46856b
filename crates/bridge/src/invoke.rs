//! Request/response invocation of named backend procedures.

use async_trait::async_trait;
use serde_json::{Map, Value};
use shared::error::BackendError;

pub type InvokeParams = Map<String, Value>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs `procedure` to completion. The returned outcome is the only
    /// terminal signal for the call; progress travels on channels.
    async fn invoke(&self, procedure: &str, params: InvokeParams) -> Result<Value, BackendError>;
}

/// Serializes a parameter struct into the object shape procedures expect.
pub fn params_from<T: serde::Serialize>(value: &T) -> Result<InvokeParams, BackendError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(InvokeParams::new()),
        Ok(other) => Err(BackendError::new(format!(
            "procedure params must be an object, got {other}"
        ))),
        Err(error) => Err(BackendError::new(format!(
            "failed to encode procedure params: {error}"
        ))),
    }
}
