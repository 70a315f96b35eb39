pub mod account;
mod error;
pub mod orchestrator;
pub mod outcome;
pub mod session;

pub use account::{is_valid_account_id, Account};
pub use error::{ErrorKind, ResetError};
pub use orchestrator::{AccountResetOrchestrator, Collaborators, ResetOptions};
pub use outcome::{FailureSummary, OutcomeReport, OutcomeStatus, ResetOutcome};
pub use session::{ResetSession, ResetState, StateTransition};
