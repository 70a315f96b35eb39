pub mod settings;

pub use settings::{
    AutomationSettings, EmailSettings, FailurePolicy, Overrides, Settings, StoreBackend,
    StoreSettings,
};

/// Problems with the run configuration, reported before any session opens
#[derive(Debug)]
pub enum ConfigError {
    Parse(String),
    Invalid(String),
    /// Mailbox password could not be resolved
    Secret(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "Failed to parse configuration: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::Secret(msg) => write!(f, "Mailbox password unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
