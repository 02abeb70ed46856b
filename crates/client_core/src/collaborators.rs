//! Typed calls to the backend procedures the client consumes but does not own.

use std::sync::Arc;

use bridge::{Backend, InvokeParams};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{
    domain::DeviceInfo,
    error::BackendError,
    protocol::{
        INVALIDATE_ACCOUNT_PROCEDURE, LIST_DEVICES_PROCEDURE, LOGGED_IN_AS_PROCEDURE,
        LOGIN_EMAIL_PASS_PROCEDURE, SET_SELECTED_DEVICE_PROCEDURE,
    },
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{procedure} failed: {source}")]
    Invoke {
        procedure: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("unexpected {procedure} response: {source}")]
    Decode {
        procedure: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Invoke { source, .. } => Some(source),
            Self::Decode { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct BackendClient {
    backend: Arc<dyn Backend>,
}

impl BackendClient {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, ClientError> {
        self.call(LIST_DEVICES_PROCEDURE, InvokeParams::new()).await
    }

    pub async fn set_selected_device(&self, device: Option<&DeviceInfo>) -> Result<(), ClientError> {
        let mut params = InvokeParams::new();
        params.insert("device".into(), json!(device));
        self.call_unit(SET_SELECTED_DEVICE_PROCEDURE, params).await
    }

    /// Logs in and returns the account's Apple ID. The backend may raise a
    /// two-factor request while this is pending.
    pub async fn login_email_pass(
        &self,
        email: &str,
        password: &str,
        anisette_server: &str,
    ) -> Result<String, ClientError> {
        let mut params = InvokeParams::new();
        params.insert("email".into(), json!(email));
        params.insert("password".into(), json!(password));
        params.insert("anisetteServer".into(), json!(anisette_server));
        self.call(LOGIN_EMAIL_PASS_PROCEDURE, params).await
    }

    pub async fn logged_in_as(&self) -> Result<Option<String>, ClientError> {
        self.call(LOGGED_IN_AS_PROCEDURE, InvokeParams::new()).await
    }

    pub async fn invalidate_account(&self) -> Result<(), ClientError> {
        self.call_unit(INVALIDATE_ACCOUNT_PROCEDURE, InvokeParams::new())
            .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        procedure: &'static str,
        params: InvokeParams,
    ) -> Result<T, ClientError> {
        let value = self.invoke(procedure, params).await?;
        serde_json::from_value(value).map_err(|source| ClientError::Decode { procedure, source })
    }

    async fn call_unit(
        &self,
        procedure: &'static str,
        params: InvokeParams,
    ) -> Result<(), ClientError> {
        self.invoke(procedure, params).await.map(|_| ())
    }

    async fn invoke(
        &self,
        procedure: &'static str,
        params: InvokeParams,
    ) -> Result<Value, ClientError> {
        debug!(procedure, "invoking backend procedure");
        self.backend
            .invoke(procedure, params)
            .await
            .map_err(|source| ClientError::Invoke { procedure, source })
    }
}
