//! Client side of the two-factor verification rendezvous.
//!
//! The backend signals on `2fa-required` when a login needs a code. The prompt
//! opens, accepts exactly one 6-character code and answers on the fixed
//! response channel. There is no timeout or cancel here; only one login flow
//! is expected to be outstanding at a time.

use std::sync::Arc;

use bridge::{ChannelError, EventChannel};
use serde_json::Value;
use shared::protocol::{
    TWO_FACTOR_CODE_LEN, TWO_FACTOR_RECEIVED_CHANNEL, TWO_FACTOR_REQUIRED_CHANNEL,
};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    Closed,
    Open,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no verification code has been requested")]
    NotRequested,
    #[error("Please enter a valid 6-digit code.")]
    InvalidLength { actual: usize },
    #[error("failed to send verification code: {0}")]
    Channel(#[from] ChannelError),
}

pub struct TwoFactorPrompt {
    events: Arc<dyn EventChannel>,
    state: Arc<watch::Sender<PromptState>>,
    listener: JoinHandle<()>,
}

impl TwoFactorPrompt {
    /// Starts listening for verification requests. Requests published after
    /// this resolves are guaranteed to open the prompt.
    pub async fn attach(events: Arc<dyn EventChannel>) -> Result<Self, ChannelError> {
        let mut requests = events.subscribe(TWO_FACTOR_REQUIRED_CHANNEL).await?;
        let (state, _) = watch::channel(PromptState::Closed);
        let state = Arc::new(state);

        let listener_state = Arc::clone(&state);
        let listener = tokio::spawn(async move {
            while requests.recv().await.is_some() {
                let opened = listener_state.send_if_modified(|prompt| {
                    if *prompt == PromptState::Open {
                        false
                    } else {
                        *prompt = PromptState::Open;
                        true
                    }
                });
                if opened {
                    info!("verification code requested");
                } else {
                    warn!("verification code requested again while the prompt is open");
                }
            }
            debug!("two-factor request channel ended");
        });

        Ok(Self {
            events,
            state,
            listener,
        })
    }

    pub fn state(&self) -> PromptState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == PromptState::Open
    }

    pub fn watch(&self) -> watch::Receiver<PromptState> {
        self.state.subscribe()
    }

    /// Resolves once a verification request has opened the prompt.
    pub async fn opened(&self) {
        let mut state = self.watch();
        // `self.state` keeps the sender alive.
        let _ = state.wait_for(|prompt| *prompt == PromptState::Open).await;
    }

    /// Sends `code` to the backend and closes the prompt.
    ///
    /// A code of the wrong length is refused without sending anything and the
    /// prompt stays open for another attempt. The prompt is closed before the
    /// code is published, so overlapping submissions send at most one code; it
    /// reopens if publishing fails.
    pub async fn submit(&self, code: &str) -> Result<(), SubmitError> {
        if !self.is_open() {
            return Err(SubmitError::NotRequested);
        }

        let actual = code.chars().count();
        if actual != TWO_FACTOR_CODE_LEN {
            debug!(actual, "rejected verification code of wrong length");
            return Err(SubmitError::InvalidLength { actual });
        }

        let claimed = self.state.send_if_modified(|prompt| {
            if *prompt == PromptState::Open {
                *prompt = PromptState::Closed;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(SubmitError::NotRequested);
        }

        if let Err(error) = self
            .events
            .publish(TWO_FACTOR_RECEIVED_CHANNEL, Value::String(code.to_string()))
            .await
        {
            self.state.send_replace(PromptState::Open);
            return Err(error.into());
        }
        info!("verification code submitted");
        Ok(())
    }
}

impl Drop for TwoFactorPrompt {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(test)]
#[path = "tests/two_factor_tests.rs"]
mod tests;
