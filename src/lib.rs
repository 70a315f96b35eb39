// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{browser, config, credentials, email, reset, runner, store, utils};

// Re-export commonly used types
pub use modules::config::Settings;
pub use modules::reset::{Account, AccountResetOrchestrator, ResetOptions, ResetOutcome};
pub use modules::runner::{run_accounts, RunPlan, RunReport};
pub use modules::store::SecretStore;

// Constants
pub const KEYRING_SERVICE: &str = "aws-root-reset";
pub const DEFAULT_PASSWORD_LENGTH: usize = 32;
pub const MIN_PASSWORD_LENGTH: usize = 14;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MIN_CHARS_PER_CLASS: usize = 2;
pub const DEFAULT_WAIT_FOR_EMAIL_SECS: u64 = 120;
pub const DEFAULT_AUTOMATION_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_MAX_SUBMIT_ATTEMPTS: u32 = 2;
pub const IMAP_PASSWORD_ENV: &str = "ROOT_RESET_IMAP_PASSWORD";
