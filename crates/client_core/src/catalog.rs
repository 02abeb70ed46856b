//! Operations the client knows how to start, with their parameter shapes.

use std::path::PathBuf;

use serde::Serialize;
use shared::domain::Operation;

pub const INSTALL_SIDESTORE_ID: &str = "install_sidestore";
pub const SIDELOAD_ID: &str = "sideload";

pub fn install_sidestore() -> Operation {
    Operation::new(INSTALL_SIDESTORE_ID, "Installing SideStore")
        .with_step("download", "Download SideStore")
        .with_step("install", "Sign & Install SideStore")
        .with_step("pairing", "Place Pairing File")
        .with_success(
            "SideStore Installed!",
            "Open SideStore and refresh it to complete the installation!",
        )
}

/// LiveContainer bundled with SideStore.
///
/// Shares the SideStore procedure; the backend tells the two apart through
/// [`InstallParams::live_container`].
pub fn install_live_container() -> Operation {
    Operation::new(INSTALL_SIDESTORE_ID, "Installing LiveContainer+SideStore")
        .with_step("download", "Download SideStore+LiveContainer")
        .with_step("install", "Sign & Install SideStore+LiveContainer")
        .with_step("pairing", "Place Pairing File")
        .with_success(
            "LiveContainer+SideStore Installed!",
            "To complete the installation, open LiveContainer, choose settings, and click \"Import Certificate From SideStore.\" Then, choose apps, click the sidestore icon, and refresh LiveContainer.",
        )
}

pub fn sideload() -> Operation {
    Operation::new(SIDELOAD_ID, "Installing App").with_step("install", "Sign & Install App")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallParams {
    pub nightly: bool,
    pub live_container: bool,
}

impl InstallParams {
    pub fn operation(&self) -> Operation {
        if self.live_container {
            install_live_container()
        } else {
            install_sidestore()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SideloadParams {
    pub app_path: PathBuf,
}
