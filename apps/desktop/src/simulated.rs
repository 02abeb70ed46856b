//! Stand-in backend so the CLI can drive every flow without a device.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use backend::{
    parse_params, register_account_procedures, Account, AccountStore, Authenticator, BuildOutput,
    Credentials, LoginService, OperationProcedure, ProcedureRouter, ProgressReporter,
    TwoFactorRequester,
};
use bridge::{EventChannel, InvokeParams};
use client_core::catalog::{INSTALL_SIDESTORE_ID, SIDELOAD_ID};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{
    domain::{ConnectionType, DeviceInfo},
    error::BackendError,
    protocol::{LIST_DEVICES_PROCEDURE, SET_SELECTED_DEVICE_PROCEDURE},
};
use tokio::time;
use tracing::info;

use crate::config::Settings;

#[derive(Debug, Default)]
struct DeviceState {
    selected: Mutex<Option<DeviceInfo>>,
}

impl DeviceState {
    fn select(&self, device: Option<DeviceInfo>) {
        *self.selected.lock().unwrap_or_else(PoisonError::into_inner) = device;
    }

    fn selected(&self) -> Result<DeviceInfo, BackendError> {
        self.selected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| BackendError::new("No device selected"))
    }
}

pub fn simulated_devices() -> Vec<DeviceInfo> {
    vec![DeviceInfo {
        name: "Simulated iPhone".into(),
        id: 1,
        uuid: "00008030-001A2B3C4D5E6F70".into(),
        connection_type: ConnectionType::Usb,
    }]
}

/// Every login asks for a second factor; any 6-digit code is accepted.
struct SimulatedAuthenticator;

#[async_trait]
impl Authenticator for SimulatedAuthenticator {
    async fn authenticate(
        &self,
        credentials: &Credentials,
        two_factor: &TwoFactorRequester,
    ) -> Result<Account, BackendError> {
        if credentials.password.is_empty() {
            return Err(BackendError::new("Incorrect password"));
        }
        info!(anisette = %credentials.anisette_url(), "using anisette server");
        let code = two_factor.request_code().await?;
        if !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(BackendError::new("Incorrect verification code"));
        }
        Ok(Account {
            apple_id: credentials.email.clone(),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallRequest {
    nightly: bool,
    live_container: bool,
}

struct SimulatedInstaller {
    accounts: Arc<AccountStore>,
    devices: Arc<DeviceState>,
    output: BuildOutput,
    delay: Duration,
}

#[async_trait]
impl OperationProcedure for SimulatedInstaller {
    async fn run(
        &self,
        progress: &ProgressReporter,
        params: InvokeParams,
    ) -> Result<Value, BackendError> {
        let request: InstallRequest = parse_params(params)?;
        let account = self.accounts.account()?;
        let device = self.devices.selected()?;
        let channel = if request.nightly { "nightly" } else { "stable" };
        let bundle = if request.live_container {
            "SideStore+LiveContainer"
        } else {
            "SideStore"
        };

        progress
            .step("download", async {
                self.output
                    .line(format!("Downloading {bundle} ({channel})"))
                    .await?;
                time::sleep(self.delay).await;
                Ok::<_, BackendError>(())
            })
            .await?;
        progress
            .step("install", async {
                self.output
                    .line(format!("Signing as {} for {}", account.apple_id, device.name))
                    .await?;
                time::sleep(self.delay).await;
                Ok::<_, BackendError>(())
            })
            .await?;
        progress
            .step("pairing", async {
                time::sleep(self.delay).await;
                Ok::<_, BackendError>(())
            })
            .await?;
        Ok(Value::Null)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SideloadRequest {
    app_path: PathBuf,
}

struct SimulatedSideload {
    accounts: Arc<AccountStore>,
    devices: Arc<DeviceState>,
    delay: Duration,
}

#[async_trait]
impl OperationProcedure for SimulatedSideload {
    async fn run(
        &self,
        progress: &ProgressReporter,
        params: InvokeParams,
    ) -> Result<Value, BackendError> {
        let request: SideloadRequest = parse_params(params)?;
        self.accounts.account()?;
        self.devices.selected()?;

        progress
            .step("install", async {
                time::sleep(self.delay).await;
                if request.app_path.is_file() {
                    Ok(())
                } else {
                    Err(BackendError::new(format!(
                        "App not found: {}",
                        request.app_path.display()
                    )))
                }
            })
            .await?;
        Ok(Value::Null)
    }
}

#[derive(Deserialize)]
struct Selection {
    device: Option<DeviceInfo>,
}

pub fn simulated_backend(events: Arc<dyn EventChannel>, settings: &Settings) -> ProcedureRouter {
    let accounts = Arc::new(AccountStore::new());
    let devices = Arc::new(DeviceState::default());
    let output = BuildOutput::new(Arc::clone(&events));
    let mut router = ProcedureRouter::new(Arc::clone(&events));

    router.register(LIST_DEVICES_PROCEDURE, |_params: InvokeParams| async {
        Ok::<_, BackendError>(json!(simulated_devices()))
    });

    let selection = Arc::clone(&devices);
    router.register(SET_SELECTED_DEVICE_PROCEDURE, move |params: InvokeParams| {
        let selection = Arc::clone(&selection);
        async move {
            let Selection { device } = parse_params(params)?;
            selection.select(device);
            Ok::<_, BackendError>(Value::Null)
        }
    });

    let login = LoginService::new(
        Arc::clone(&accounts),
        Arc::new(SimulatedAuthenticator),
        TwoFactorRequester::with_timeout(Arc::clone(&events), settings.two_factor_timeout()),
        output.clone(),
    );
    register_account_procedures(&mut router, Arc::new(login));

    router.register_operation(
        INSTALL_SIDESTORE_ID,
        SimulatedInstaller {
            accounts: Arc::clone(&accounts),
            devices: Arc::clone(&devices),
            output,
            delay: settings.simulated_step_delay(),
        },
    );
    router.register_operation(
        SIDELOAD_ID,
        SimulatedSideload {
            accounts,
            devices,
            delay: settings.simulated_step_delay(),
        },
    );

    router
}

#[cfg(test)]
#[path = "tests/simulated_tests.rs"]
mod tests;
