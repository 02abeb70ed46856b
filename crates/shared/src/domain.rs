use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::{operation_procedure_name, progress_channel_name};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(OperationId);
id_newtype!(StepId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStep {
    pub id: StepId,
    pub title: String,
}

impl OperationStep {
    pub fn new(id: impl Into<StepId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Immutable definition of a multi-step backend task.
///
/// The id doubles as the correlation key: the backend reports progress on
/// `operation_<id>` and is invoked through the `<id>_operation` procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: OperationId,
    pub title: String,
    pub steps: Vec<OperationStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
}

impl Operation {
    pub fn new(id: impl Into<OperationId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            steps: Vec::new(),
            success_title: None,
            success_message: None,
        }
    }

    pub fn with_step(mut self, id: impl Into<StepId>, title: impl Into<String>) -> Self {
        self.steps.push(OperationStep::new(id, title));
        self
    }

    pub fn with_success(mut self, title: impl Into<String>, message: impl Into<String>) -> Self {
        self.success_title = Some(title.into());
        self.success_message = Some(message.into());
        self
    }

    pub fn progress_channel(&self) -> String {
        progress_channel_name(&self.id)
    }

    pub fn procedure_name(&self) -> String {
        operation_procedure_name(&self.id)
    }

    pub fn step(&self, step_id: &StepId) -> Option<&OperationStep> {
        self.steps.iter().find(|step| &step.id == step_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    #[serde(rename = "USB")]
    Usb,
    Network,
    Unknown,
}

/// A device as reported by the backend's enumeration procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub id: u32,
    pub uuid: String,
    pub connection_type: ConnectionType,
}
