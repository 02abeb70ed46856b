use serde::{Deserialize, Serialize};

use crate::domain::{OperationId, StepId};

pub const OPERATION_CHANNEL_PREFIX: &str = "operation_";
pub const OPERATION_PROCEDURE_SUFFIX: &str = "_operation";

/// Raised by the backend when a login needs a verification code. No payload.
pub const TWO_FACTOR_REQUIRED_CHANNEL: &str = "2fa-required";
/// Carries the verification code back to the backend.
///
/// The spelling matches the deployed backend and must not be corrected.
pub const TWO_FACTOR_RECEIVED_CHANNEL: &str = "2fa-recieved";
pub const TWO_FACTOR_CODE_LEN: usize = 6;

pub const BUILD_OUTPUT_CHANNEL: &str = "build-output";

pub const LIST_DEVICES_PROCEDURE: &str = "list_devices";
pub const SET_SELECTED_DEVICE_PROCEDURE: &str = "set_selected_device";
pub const LOGIN_EMAIL_PASS_PROCEDURE: &str = "login_email_pass";
pub const LOGGED_IN_AS_PROCEDURE: &str = "logged_in_as";
pub const INVALIDATE_ACCOUNT_PROCEDURE: &str = "invalidate_account";

pub fn progress_channel_name(operation_id: &OperationId) -> String {
    format!("{OPERATION_CHANNEL_PREFIX}{operation_id}")
}

pub fn operation_procedure_name(operation_id: &OperationId) -> String {
    format!("{operation_id}{OPERATION_PROCEDURE_SUFFIX}")
}

/// Progress event emitted by the backend on an operation's progress channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "updateType", rename_all = "snake_case")]
pub enum OperationUpdate {
    #[serde(rename_all = "camelCase")]
    Started { step_id: StepId },
    #[serde(rename_all = "camelCase")]
    Finished { step_id: StepId },
    #[serde(rename_all = "camelCase")]
    Failed {
        step_id: StepId,
        extra_details: String,
    },
}

impl OperationUpdate {
    pub fn started(step_id: impl Into<StepId>) -> Self {
        Self::Started {
            step_id: step_id.into(),
        }
    }

    pub fn finished(step_id: impl Into<StepId>) -> Self {
        Self::Finished {
            step_id: step_id.into(),
        }
    }

    pub fn failed(step_id: impl Into<StepId>, extra_details: impl Into<String>) -> Self {
        Self::Failed {
            step_id: step_id.into(),
            extra_details: extra_details.into(),
        }
    }

    pub fn step_id(&self) -> &StepId {
        match self {
            Self::Started { step_id } | Self::Finished { step_id } | Self::Failed { step_id, .. } => {
                step_id
            }
        }
    }
}
