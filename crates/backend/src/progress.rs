use std::{future::Future, sync::Arc};

use bridge::{publish_serialized, EventChannel};
use shared::{
    domain::{OperationId, StepId},
    error::BackendError,
    protocol::{progress_channel_name, OperationUpdate},
};
use tracing::debug;

/// Emits step updates on one operation's progress channel.
#[derive(Clone)]
pub struct ProgressReporter {
    events: Arc<dyn EventChannel>,
    channel: String,
}

impl ProgressReporter {
    pub fn new(events: Arc<dyn EventChannel>, operation_id: &OperationId) -> Self {
        Self {
            events,
            channel: progress_channel_name(operation_id),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn started(&self, step_id: impl Into<StepId>) -> Result<(), BackendError> {
        self.emit(OperationUpdate::started(step_id)).await
    }

    pub async fn finished(&self, step_id: impl Into<StepId>) -> Result<(), BackendError> {
        self.emit(OperationUpdate::finished(step_id)).await
    }

    pub async fn failed(
        &self,
        step_id: impl Into<StepId>,
        extra_details: impl Into<String>,
    ) -> Result<(), BackendError> {
        self.emit(OperationUpdate::failed(step_id, extra_details))
            .await
    }

    /// Wraps `work` in Started and Finished, or Failed with the error text.
    pub async fn step<T, F>(&self, step_id: &str, work: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>> + Send,
    {
        self.started(step_id).await?;
        match work.await {
            Ok(value) => {
                self.finished(step_id).await?;
                Ok(value)
            }
            Err(error) => {
                self.failed(step_id, error.message()).await?;
                Err(error)
            }
        }
    }

    async fn emit(&self, update: OperationUpdate) -> Result<(), BackendError> {
        let delivered = publish_serialized(self.events.as_ref(), &self.channel, &update)
            .await
            .map_err(|error| BackendError::new(error.to_string()))?;
        debug!(channel = %self.channel, step = %update.step_id(), delivered, "progress emitted");
        Ok(())
    }
}
