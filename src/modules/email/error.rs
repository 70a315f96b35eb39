use std::time::Duration;

use crate::modules::utils::time::format_duration;

/// Failures while waiting for a reset email
#[derive(Debug)]
pub enum EmailError {
    /// Mailbox rejected the credential; retrying cannot help
    Auth(String),
    /// No qualifying message arrived within the wait budget
    Timeout(Duration),
    /// A reset email arrived but no known link format matched
    Parse(String),
    /// Network or protocol trouble; the poll loop reconnects on the next round
    Connection(String),
    /// Unknown provider or unusable inbox settings
    Config(String),
}

impl std::fmt::Display for EmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailError::Auth(msg) => write!(f, "mailbox authentication failed: {}", msg),
            EmailError::Timeout(waited) => write!(
                f,
                "email not received within budget ({})",
                format_duration(*waited)
            ),
            EmailError::Parse(msg) => write!(f, "reset email could not be parsed: {}", msg),
            EmailError::Connection(msg) => write!(f, "mailbox connection error: {}", msg),
            EmailError::Config(msg) => write!(f, "mailbox configuration error: {}", msg),
        }
    }
}

impl std::error::Error for EmailError {}

impl From<imap::Error> for EmailError {
    fn from(error: imap::Error) -> Self {
        EmailError::Connection(error.to_string())
    }
}

impl From<std::io::Error> for EmailError {
    fn from(error: std::io::Error) -> Self {
        EmailError::Connection(error.to_string())
    }
}
