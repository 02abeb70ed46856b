use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bridge::InvokeParams;
use serde::Deserialize;
use serde_json::Value;
use shared::{
    error::BackendError,
    protocol::{INVALIDATE_ACCOUNT_PROCEDURE, LOGGED_IN_AS_PROCEDURE, LOGIN_EMAIL_PASS_PROCEDURE},
};
use tracing::{info, warn};

use crate::{
    output::BuildOutput,
    router::{parse_params, ProcedureRouter},
    two_factor::TwoFactorRequester,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub apple_id: String,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub anisette_server: String,
}

impl Credentials {
    pub fn anisette_url(&self) -> String {
        format!("https://{}", self.anisette_server)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("anisette_server", &self.anisette_server)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        credentials: &Credentials,
        two_factor: &TwoFactorRequester,
    ) -> Result<Account, BackendError>;
}

#[derive(Debug, Default)]
pub struct AccountStore {
    current: Mutex<Option<Arc<Account>>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self) -> Result<Arc<Account>, BackendError> {
        self.logged_in()
            .ok_or_else(|| BackendError::new("Not logged in"))
    }

    pub fn logged_in(&self) -> Option<Arc<Account>> {
        self.lock().clone()
    }

    pub fn store(&self, account: Account) -> Arc<Account> {
        let account = Arc::new(account);
        *self.lock() = Some(Arc::clone(&account));
        account
    }

    pub fn invalidate(&self) -> Option<Arc<Account>> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<Account>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct LoginService {
    store: Arc<AccountStore>,
    authenticator: Arc<dyn Authenticator>,
    two_factor: TwoFactorRequester,
    output: BuildOutput,
}

impl LoginService {
    pub fn new(
        store: Arc<AccountStore>,
        authenticator: Arc<dyn Authenticator>,
        two_factor: TwoFactorRequester,
        output: BuildOutput,
    ) -> Self {
        Self {
            store,
            authenticator,
            two_factor,
            output,
        }
    }

    pub fn store(&self) -> &Arc<AccountStore> {
        &self.store
    }

    pub async fn login(&self, credentials: Credentials) -> Result<Arc<Account>, BackendError> {
        self.output.line("Logging in...").await?;
        match self
            .authenticator
            .authenticate(&credentials, &self.two_factor)
            .await
        {
            Ok(account) => {
                let account = self.store.store(account);
                info!(apple_id = %account.apple_id, "logged in");
                self.output.line("Successfully logged in").await?;
                Ok(account)
            }
            Err(error) => {
                warn!(email = %credentials.email, %error, "login failed");
                self.output.line("Login failed or cancelled").await?;
                self.output.line(error.message()).await?;
                Err(error)
            }
        }
    }
}

pub fn register_account_procedures(router: &mut ProcedureRouter, service: Arc<LoginService>) {
    let login = Arc::clone(&service);
    router.register(LOGIN_EMAIL_PASS_PROCEDURE, move |params: InvokeParams| {
        let login = Arc::clone(&login);
        async move {
            let credentials: Credentials = parse_params(params)?;
            let account = login.login(credentials).await?;
            Ok::<_, BackendError>(Value::String(account.apple_id.clone()))
        }
    });

    let store = Arc::clone(service.store());
    router.register(LOGGED_IN_AS_PROCEDURE, move |_params: InvokeParams| {
        let account = store.logged_in();
        async move {
            Ok::<_, BackendError>(account.map_or(Value::Null, |account| {
                Value::String(account.apple_id.clone())
            }))
        }
    });

    let store = Arc::clone(service.store());
    router.register(INVALIDATE_ACCOUNT_PROCEDURE, move |_params: InvokeParams| {
        let cleared = store.invalidate();
        async move {
            if let Some(account) = cleared {
                info!(apple_id = %account.apple_id, "account invalidated");
            }
            Ok::<_, BackendError>(Value::Null)
        }
    });
}

#[cfg(test)]
#[path = "tests/account_tests.rs"]
mod tests;
