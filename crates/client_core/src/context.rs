//! Account and device selection a surface must hold before starting installs.

use shared::domain::DeviceInfo;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("You must be logged in!")]
    NotLoggedIn,
    #[error("You must select a device!")]
    NoDeviceSelected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub logged_in_as: Option<String>,
    pub selected_device: Option<DeviceInfo>,
}

impl ClientContext {
    pub fn require_login(&self) -> Result<&str, PreconditionError> {
        self.logged_in_as
            .as_deref()
            .ok_or(PreconditionError::NotLoggedIn)
    }

    pub fn require_device(&self) -> Result<&DeviceInfo, PreconditionError> {
        self.selected_device
            .as_ref()
            .ok_or(PreconditionError::NoDeviceSelected)
    }

    /// Installs need both; the login check wins when both are missing.
    pub fn require_install_ready(&self) -> Result<(), PreconditionError> {
        self.require_login()?;
        self.require_device()?;
        Ok(())
    }

    /// Picks the first device of a fresh listing, or clears the selection.
    pub fn select_first(&mut self, devices: &[DeviceInfo]) -> Option<&DeviceInfo> {
        self.selected_device = devices.first().cloned();
        self.selected_device.as_ref()
    }
}
