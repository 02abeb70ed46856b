//! Dispatch of a backend operation with correlated progress tracking.
//!
//! A dispatch attaches to `operation_<id>` before invoking `<id>_operation`,
//! folds every progress message that arrives while the invocation is
//! outstanding, and detaches once the invocation settles. The invocation's
//! outcome is the dispatch's outcome; step failures only show up in state.

use std::sync::Arc;

use bridge::{Backend, ChannelError, EventChannel, InvokeParams, Subscription};
use futures::StreamExt;
use serde_json::Value;
use shared::{domain::Operation, error::BackendError, protocol::OperationUpdate};
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::{OperationBoard, OperationSession};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to listen for progress on {channel}: {source}")]
    Subscription {
        channel: String,
        #[source]
        source: ChannelError,
    },
    #[error(transparent)]
    Invocation(#[from] BackendError),
}

impl DispatchError {
    /// The backend's own failure value, when the invocation itself failed.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Invocation(error) => Some(error),
            Self::Subscription { .. } => None,
        }
    }
}

/// Final session of a dispatch together with its outcome.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub session: OperationSession,
    pub result: Result<Value, DispatchError>,
}

pub struct OperationDispatcher {
    events: Arc<dyn EventChannel>,
    backend: Arc<dyn Backend>,
    board: Arc<OperationBoard>,
}

impl OperationDispatcher {
    pub fn new(
        events: Arc<dyn EventChannel>,
        backend: Arc<dyn Backend>,
        board: Arc<OperationBoard>,
    ) -> Self {
        Self {
            events,
            backend,
            board,
        }
    }

    pub fn board(&self) -> &Arc<OperationBoard> {
        &self.board
    }

    /// Runs `operation` and settles with the backend invocation's outcome.
    ///
    /// Starting another dispatch replaces the visible session but does not
    /// cancel this one.
    pub async fn dispatch(
        &self,
        operation: Operation,
        params: InvokeParams,
    ) -> Result<Value, DispatchError> {
        self.dispatch_tracked(operation, params).await.result
    }

    pub async fn dispatch_tracked(
        &self,
        operation: Operation,
        params: InvokeParams,
    ) -> DispatchOutcome {
        let mut session = OperationSession::begin(operation);
        if let Some(previous) = self.board.replace(session.clone()) {
            debug!(session = %session.id(), %previous, "replaced visible operation session");
        }

        let result = self.run(&mut session, params).await;
        DispatchOutcome { session, result }
    }

    async fn run(
        &self,
        session: &mut OperationSession,
        params: InvokeParams,
    ) -> Result<Value, DispatchError> {
        let operation_id = session.operation().id.clone();
        let channel = session.operation().progress_channel();
        let procedure = session.operation().procedure_name();

        let subscription = match self.events.subscribe(&channel).await {
            Ok(subscription) => subscription,
            Err(source) => {
                warn!(operation = %operation_id, %channel, %source, "progress channel unavailable; operation not started");
                self.board.dispose(session.id());
                return Err(DispatchError::Subscription {
                    channel: channel.clone(),
                    source,
                });
            }
        };

        debug!(operation = %operation_id, session = %session.id(), %procedure, "invoking operation");
        let outcome = self
            .track_invocation(session, subscription, &procedure, params)
            .await;

        match &outcome {
            Ok(_) => debug!(operation = %operation_id, session = %session.id(), "operation finished"),
            Err(error) => {
                debug!(operation = %operation_id, session = %session.id(), %error, "operation failed")
            }
        }
        outcome.map_err(DispatchError::from)
    }

    /// Folds progress until the invocation settles, then folds whatever is
    /// already buffered and releases the listener. Anything delivered before
    /// the release is counted, including a message a backend task publishes
    /// concurrently with settlement on a multi-threaded runtime. `subscription`
    /// is owned here so the listener is released on every exit, including
    /// unwinding.
    async fn track_invocation(
        &self,
        session: &mut OperationSession,
        mut subscription: Subscription,
        procedure: &str,
        params: InvokeParams,
    ) -> Result<Value, BackendError> {
        let mut invocation = self.backend.invoke(procedure, params);
        let mut listening = true;

        let outcome = loop {
            tokio::select! {
                biased;
                message = subscription.next(), if listening => match message {
                    Some(payload) => self.fold(session, payload),
                    None => {
                        debug!(channel = subscription.channel(), "progress channel ended before invocation settled");
                        listening = false;
                    }
                },
                outcome = &mut invocation => break outcome,
            }
        };

        // A backend that publishes and returns within one poll leaves its
        // progress buffered. Whatever is queued before the release is folded.
        if listening {
            while let Some(payload) = subscription.try_recv() {
                self.fold(session, payload);
            }
        }

        subscription.unsubscribe();
        outcome
    }

    fn fold(&self, session: &mut OperationSession, payload: Value) {
        match serde_json::from_value::<OperationUpdate>(payload) {
            Ok(update) => {
                session.apply(update);
                self.board.update(session);
            }
            Err(error) => {
                warn!(operation = %session.operation().id, %error, "discarding malformed progress update");
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
