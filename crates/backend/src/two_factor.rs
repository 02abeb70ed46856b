use std::{sync::Arc, time::Duration};

use bridge::{ChannelError, EventChannel};
use serde_json::Value;
use shared::{
    error::BackendError,
    protocol::{TWO_FACTOR_RECEIVED_CHANNEL, TWO_FACTOR_REQUIRED_CHANNEL},
};
use thiserror::Error;
use tokio::time;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TwoFactorError {
    #[error("2FA cancelled or timed out")]
    TimedOut,
    #[error("2FA disconnected")]
    Disconnected,
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl From<TwoFactorError> for BackendError {
    fn from(error: TwoFactorError) -> Self {
        BackendError::new(error.to_string())
    }
}

/// Asks the client for a verification code and waits for the answer.
#[derive(Clone)]
pub struct TwoFactorRequester {
    events: Arc<dyn EventChannel>,
    timeout: Duration,
}

impl TwoFactorRequester {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(events: Arc<dyn EventChannel>) -> Self {
        Self::with_timeout(events, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(events: Arc<dyn EventChannel>, timeout: Duration) -> Self {
        Self { events, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The answer listener is attached before the request goes out, so a
    /// client that replies immediately is never missed.
    pub async fn request_code(&self) -> Result<String, TwoFactorError> {
        let mut answers = self.events.subscribe(TWO_FACTOR_RECEIVED_CHANNEL).await?;
        let asked = self
            .events
            .publish(TWO_FACTOR_REQUIRED_CHANNEL, Value::Null)
            .await?;
        if asked == 0 {
            warn!("2FA requested with no prompt listening");
        }
        debug!(timeout_secs = self.timeout.as_secs(), "waiting for 2FA code");

        let answer = time::timeout(self.timeout, answers.recv()).await;
        answers.unsubscribe();

        match answer {
            Err(_) => Err(TwoFactorError::TimedOut),
            Ok(None) => Err(TwoFactorError::Disconnected),
            Ok(Some(code)) => Ok(normalize_code(&code)),
        }
    }
}

fn normalize_code(code: &Value) -> String {
    match code {
        Value::String(text) => text.trim_matches('"').to_string(),
        other => other.to_string().trim_matches('"').to_string(),
    }
}

#[cfg(test)]
#[path = "tests/two_factor_tests.rs"]
mod tests;
