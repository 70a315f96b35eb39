use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::modules::browser::BrowserError;
use crate::modules::credentials::CredentialError;
use crate::modules::email::EmailError;
use crate::modules::utils::time::format_duration;

/// Failure classes reported per account
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Config,
    Auth,
    Browser,
    Navigation,
    UiElementNotFound,
    SubmissionRejected,
    Timeout,
    Parse,
    Validation,
    VerificationFailed,
    Interrupted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Auth => "auth",
            ErrorKind::Browser => "browser",
            ErrorKind::Navigation => "navigation",
            ErrorKind::UiElementNotFound => "ui-element-not-found",
            ErrorKind::SubmissionRejected => "submission-rejected",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Parse => "parse",
            ErrorKind::Validation => "validation",
            ErrorKind::VerificationFailed => "verification-failed",
            ErrorKind::Interrupted => "interrupted",
        }
    }

    /// Conditions a later re-run may clear on its own
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one reset session ended in FAILED
#[derive(Debug, Clone, PartialEq)]
pub enum ResetError {
    Config(String),
    Auth(String),
    Launch(String),
    Navigation(String),
    UiElementNotFound(String),
    SubmissionRejected(String),
    EmailTimeout(Duration),
    StepTimeout(String),
    AutomationTimeout(Duration),
    Parse(String),
    CredentialRejected { attempts: u32, last: String },
    VerificationFailed,
    Interrupted,
}

impl ResetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResetError::Config(_) => ErrorKind::Config,
            ResetError::Auth(_) => ErrorKind::Auth,
            ResetError::Launch(_) => ErrorKind::Browser,
            ResetError::Navigation(_) => ErrorKind::Navigation,
            ResetError::UiElementNotFound(_) => ErrorKind::UiElementNotFound,
            ResetError::SubmissionRejected(_) => ErrorKind::SubmissionRejected,
            ResetError::EmailTimeout(_)
            | ResetError::StepTimeout(_)
            | ResetError::AutomationTimeout(_) => ErrorKind::Timeout,
            ResetError::Parse(_) => ErrorKind::Parse,
            ResetError::CredentialRejected { .. } => ErrorKind::Validation,
            ResetError::VerificationFailed => ErrorKind::VerificationFailed,
            ResetError::Interrupted => ErrorKind::Interrupted,
        }
    }
}

impl std::fmt::Display for ResetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetError::Config(msg) => write!(f, "configuration error: {}", msg),
            ResetError::Auth(msg) => write!(f, "mailbox authentication failed: {}", msg),
            ResetError::Launch(msg) => write!(f, "browser launch failed: {}", msg),
            ResetError::Navigation(msg) => write!(f, "navigation failed: {}", msg),
            ResetError::UiElementNotFound(msg) => write!(f, "page element not found: {}", msg),
            ResetError::SubmissionRejected(msg) => write!(f, "reset request rejected: {}", msg),
            ResetError::EmailTimeout(waited) => write!(
                f,
                "email not received within budget ({})",
                format_duration(*waited)
            ),
            ResetError::StepTimeout(msg) => write!(f, "automation step timed out: {}", msg),
            ResetError::AutomationTimeout(budget) => write!(
                f,
                "automation timeout exceeded ({})",
                format_duration(*budget)
            ),
            ResetError::Parse(msg) => write!(f, "reset email unusable: {}", msg),
            ResetError::CredentialRejected { attempts, last } => write!(
                f,
                "credential rejected after {} attempt(s): {}",
                attempts, last
            ),
            ResetError::VerificationFailed => write!(f, "post-reset login verification failed"),
            ResetError::Interrupted => write!(f, "interrupted before completion"),
        }
    }
}

impl std::error::Error for ResetError {}

impl From<BrowserError> for ResetError {
    fn from(error: BrowserError) -> Self {
        match error {
            BrowserError::Launch(msg) => ResetError::Launch(msg),
            BrowserError::Navigation(msg) => ResetError::Navigation(msg),
            BrowserError::UiElementNotFound(msg) => ResetError::UiElementNotFound(msg),
            BrowserError::SubmissionRejected(msg) => ResetError::SubmissionRejected(msg),
            BrowserError::Validation(msg) => ResetError::CredentialRejected {
                attempts: 1,
                last: msg,
            },
            BrowserError::Timeout(msg) => ResetError::StepTimeout(msg),
        }
    }
}

impl From<EmailError> for ResetError {
    fn from(error: EmailError) -> Self {
        match error {
            EmailError::Auth(msg) => ResetError::Auth(msg),
            EmailError::Timeout(waited) => ResetError::EmailTimeout(waited),
            EmailError::Parse(msg) => ResetError::Parse(msg),
            EmailError::Connection(msg) => ResetError::StepTimeout(format!("mailbox: {}", msg)),
            EmailError::Config(msg) => ResetError::Config(msg),
        }
    }
}

impl From<CredentialError> for ResetError {
    fn from(error: CredentialError) -> Self {
        ResetError::Config(error.to_string())
    }
}
