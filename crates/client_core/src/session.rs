//! Operation sessions and the single visible operation slot of a surface.

use std::fmt;

use chrono::{DateTime, Utc};
use shared::{domain::Operation, protocol::OperationUpdate};
use tokio::sync::watch;
use uuid::Uuid;

use crate::progress::OperationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One dispatch of an operation and the progress folded for it so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSession {
    id: SessionId,
    started_at: DateTime<Utc>,
    state: OperationState,
}

impl OperationSession {
    pub fn begin(operation: Operation) -> Self {
        Self {
            id: SessionId::new(),
            started_at: Utc::now(),
            state: OperationState::new(operation),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> &OperationState {
        &self.state
    }

    pub fn operation(&self) -> &Operation {
        &self.state.current
    }

    pub fn apply(&mut self, update: OperationUpdate) {
        self.state.apply(update);
    }

    pub fn into_state(self) -> OperationState {
        self.state
    }
}

/// Holds at most one visible session and broadcasts every change of it.
///
/// Beginning a new session replaces the visible one. Updates for a session
/// that is no longer visible are ignored here; they still reach that
/// session's owner.
pub struct OperationBoard {
    visible: watch::Sender<Option<OperationSession>>,
}

impl OperationBoard {
    pub fn new() -> Self {
        let (visible, _) = watch::channel(None);
        Self { visible }
    }

    pub fn watch(&self) -> watch::Receiver<Option<OperationSession>> {
        self.visible.subscribe()
    }

    pub fn current(&self) -> Option<OperationSession> {
        self.visible.borrow().clone()
    }

    pub fn current_id(&self) -> Option<SessionId> {
        self.visible.borrow().as_ref().map(OperationSession::id)
    }

    /// Shows `session`, returning the id of the session it displaced.
    pub fn replace(&self, session: OperationSession) -> Option<SessionId> {
        self.visible
            .send_replace(Some(session))
            .map(|previous| previous.id())
    }

    /// Publishes a newer snapshot of `session` if it is still the visible one.
    pub fn update(&self, session: &OperationSession) -> bool {
        self.visible.send_if_modified(|visible| match visible {
            Some(current) if current.id() == session.id() => {
                *current = session.clone();
                true
            }
            _ => false,
        })
    }

    /// Clears the visible session, whatever it is.
    pub fn dismiss(&self) -> Option<OperationSession> {
        self.visible.send_replace(None)
    }

    /// Clears the visible session only if it is `id`.
    pub fn dispose(&self, id: SessionId) -> bool {
        self.visible.send_if_modified(|visible| {
            if visible.as_ref().map(OperationSession::id) == Some(id) {
                *visible = None;
                true
            } else {
                false
            }
        })
    }
}

impl Default for OperationBoard {
    fn default() -> Self {
        Self::new()
    }
}
