//! Backend half of the operation bridge.
//!
//! Procedures are registered on a [`ProcedureRouter`], which is what the
//! client invokes. Long-running operations report step progress through a
//! [`ProgressReporter`]; logins that need a verification code go through the
//! [`TwoFactorRequester`].

pub mod account;
pub mod output;
pub mod progress;
pub mod router;
pub mod two_factor;

pub use account::{
    register_account_procedures, Account, AccountStore, Authenticator, Credentials, LoginService,
};
pub use output::BuildOutput;
pub use progress::ProgressReporter;
pub use router::{parse_params, OperationProcedure, Procedure, ProcedureRouter};
pub use two_factor::{TwoFactorError, TwoFactorRequester};
