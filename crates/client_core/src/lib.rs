//! Client half of the operation bridge: dispatching backend operations,
//! folding their progress, and answering two-factor requests.

pub mod catalog;
pub mod collaborators;
pub mod context;
pub mod dispatcher;
pub mod progress;
pub mod session;
pub mod two_factor;

pub use collaborators::{BackendClient, ClientError};
pub use context::{ClientContext, PreconditionError};
pub use dispatcher::{DispatchError, DispatchOutcome, OperationDispatcher};
pub use progress::{reduce, FailedStep, OperationState, StepStatus};
pub use session::{OperationBoard, OperationSession, SessionId};
pub use two_factor::{PromptState, SubmitError, TwoFactorPrompt};
