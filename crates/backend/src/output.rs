use std::sync::Arc;

use bridge::EventChannel;
use serde_json::Value;
use shared::{error::BackendError, protocol::BUILD_OUTPUT_CHANNEL};

/// Free-form status lines for whoever is listening on `build-output`.
#[derive(Clone)]
pub struct BuildOutput {
    events: Arc<dyn EventChannel>,
}

impl BuildOutput {
    pub fn new(events: Arc<dyn EventChannel>) -> Self {
        Self { events }
    }

    pub async fn line(&self, line: impl Into<String>) -> Result<(), BackendError> {
        self.events
            .publish(BUILD_OUTPUT_CHANNEL, Value::String(line.into()))
            .await
            .map(|_| ())
            .map_err(|error| BackendError::new(error.to_string()))
    }
}
