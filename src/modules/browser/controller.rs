use secrecy::SecretString;
use std::time::Duration;
use url::Url;

/// Failures raised by a browser automation step
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserError {
    /// The automation process could not be started
    Launch(String),
    /// Page unreachable, unexpected, or the reset link is expired
    Navigation(String),
    /// An expected control is missing, usually a page layout change
    UiElementNotFound(String),
    /// The provider refused the submitted account or email
    SubmissionRejected(String),
    /// The provider refused the new credential
    Validation(String),
    /// The step ran past its time budget
    Timeout(String),
}

impl std::fmt::Display for BrowserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrowserError::Launch(msg) => write!(f, "browser launch failed: {}", msg),
            BrowserError::Navigation(msg) => write!(f, "navigation failed: {}", msg),
            BrowserError::UiElementNotFound(msg) => write!(f, "page element not found: {}", msg),
            BrowserError::SubmissionRejected(msg) => write!(f, "submission rejected: {}", msg),
            BrowserError::Validation(msg) => write!(f, "credential rejected: {}", msg),
            BrowserError::Timeout(msg) => write!(f, "browser step timed out: {}", msg),
        }
    }
}

impl std::error::Error for BrowserError {}

/// One live automation session bound to one account.
///
/// Operations are called in the order of the reset flow; each is bounded by
/// the timeout last passed to `set_step_timeout`.
pub trait BrowserSession {
    fn set_step_timeout(&mut self, timeout: Duration);

    fn open_login(&mut self, account_id: &str) -> Result<(), BrowserError>;

    fn trigger_forgot_password(&mut self, email: &str) -> Result<(), BrowserError>;

    fn open_reset_link(&mut self, link: &Url) -> Result<(), BrowserError>;

    fn submit_new_password(&mut self, credential: &SecretString) -> Result<(), BrowserError>;

    /// Fresh sign-in with the new credential. `Ok(false)` means the provider
    /// did not let us in, which is an outcome, not an automation error.
    fn verify_login(
        &mut self,
        account_id: &str,
        credential: &SecretString,
    ) -> Result<bool, BrowserError>;

    /// Best-effort debugging artefact after a failed step
    fn capture_diagnostics(&mut self, _label: &str) {}

    /// Terminate the automation process
    fn close(&mut self);
}

/// Starts sessions; shared read-only across accounts
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, root_email: &str) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// Owns a session and closes it exactly once, on release or drop
pub struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session(&mut self) -> Result<&mut dyn BrowserSession, BrowserError> {
        match self.session.as_mut() {
            Some(session) => Ok(session.as_mut()),
            None => Err(BrowserError::Launch("session already released".to_string())),
        }
    }

    pub fn is_released(&self) -> bool {
        self.session.is_none()
    }

    pub fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}
