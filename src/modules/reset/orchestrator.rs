use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::account::Account;
use super::error::ResetError;
use super::outcome::ResetOutcome;
use super::session::{ResetSession, ResetState};
use crate::modules::browser::{BrowserError, BrowserLauncher, BrowserSession, SessionGuard};
use crate::modules::credentials::PasswordGenerator;
use crate::modules::email::{EmailError, EmailRetriever, MailboxConnector, ResetLink};
use crate::modules::store::{SecretStore, StoreError};
use crate::modules::utils::logging::format_sensitive;
use crate::modules::utils::time::{Clock, Deadline};
use crate::{
    DEFAULT_AUTOMATION_TIMEOUT_SECS, DEFAULT_MAX_SUBMIT_ATTEMPTS, DEFAULT_PASSWORD_LENGTH,
    DEFAULT_STEP_TIMEOUT_SECS, DEFAULT_WAIT_FOR_EMAIL_SECS,
};

/// Per-run knobs for a reset session
#[derive(Debug, Clone, PartialEq)]
pub struct ResetOptions {
    /// Reset even when the record says a password is already set
    pub force_reset: bool,
    pub wait_for_email: Duration,
    /// Whole-session budget, measured from the first browser action
    pub automation_timeout: Duration,
    pub step_timeout: Duration,
    /// Total submissions allowed when the page rejects the credential
    pub max_submit_attempts: u32,
    pub password_length: usize,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            force_reset: false,
            wait_for_email: Duration::from_secs(DEFAULT_WAIT_FOR_EMAIL_SECS),
            automation_timeout: Duration::from_secs(DEFAULT_AUTOMATION_TIMEOUT_SECS),
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            max_submit_attempts: DEFAULT_MAX_SUBMIT_ATTEMPTS,
            password_length: DEFAULT_PASSWORD_LENGTH,
        }
    }
}

/// Shared services a session borrows from the runner
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub store: &'a dyn SecretStore,
    pub browser: &'a dyn BrowserLauncher,
    pub mailbox: &'a dyn MailboxConnector,
    pub retriever: &'a EmailRetriever,
    pub clock: &'a dyn Clock,
    /// Set on SIGINT/SIGTERM; checked at every step boundary
    pub interrupted: &'a AtomicBool,
}

/// Drives one account from INIT to DONE or FAILED
pub struct AccountResetOrchestrator<'a> {
    account: Account,
    options: &'a ResetOptions,
    deps: Collaborators<'a>,
}

impl<'a> AccountResetOrchestrator<'a> {
    pub fn new(account: Account, options: &'a ResetOptions, deps: Collaborators<'a>) -> Self {
        Self {
            account,
            options,
            deps,
        }
    }

    /// Run the session to a terminal state.
    ///
    /// Every per-account problem ends up in the returned outcome. Only an
    /// unreachable secret store is returned as an error, since no other
    /// account can make progress without it.
    pub fn run(&self) -> Result<ResetOutcome, StoreError> {
        let clock = self.deps.clock;
        let mut session = ResetSession::new(self.account.clone(), clock.now());
        session.enter(ResetState::CheckIdempotent, clock.now());

        if let Err(error) = self.check_idempotent(&mut session)? {
            session.fail(error, clock.now());
        } else if !session.state().is_terminal() {
            match self.reset(&mut session) {
                Ok(()) => {
                    info!(
                        "[{}] password reset and verified for {}",
                        self.account.name,
                        format_sensitive(&self.account.email)
                    );
                    session.complete(clock.now());
                }
                Err(error) => session.fail(error, clock.now()),
            }
        }

        Ok(session.into_outcome(clock.now()))
    }

    /// The outer result is infrastructure, the inner one belongs to this account
    fn check_idempotent(
        &self,
        session: &mut ResetSession,
    ) -> Result<Result<(), ResetError>, StoreError> {
        let record = match self.deps.store.read(&self.account.secret_id) {
            Ok(record) => record,
            Err(StoreError::Corrupt(msg)) => {
                return Ok(Err(ResetError::Config(format!(
                    "secret record {} unreadable: {}",
                    self.account.secret_id, msg
                ))))
            }
            Err(e) => return Err(e),
        };

        let record = match record {
            Some(record) => record,
            None => {
                return Ok(Err(ResetError::Config(format!(
                    "no secret record at {}; run init-record first",
                    self.account.secret_id
                ))))
            }
        };

        if !record.account_id.is_empty() && record.account_id != self.account.account_id {
            return Ok(Err(ResetError::Config(format!(
                "secret record {} belongs to account {}",
                self.account.secret_id, record.account_id
            ))));
        }

        if record.password_set && !self.options.force_reset {
            info!(
                "[{}] password already set, skipping (use --force-reset to override)",
                self.account.name
            );
            session.skip(self.deps.clock.now());
        } else if record.password_set {
            warn!("[{}] password already set, resetting anyway", self.account.name);
        }
        Ok(Ok(()))
    }

    /// Everything after the idempotency guard. The browser session is
    /// released before this returns, on every path.
    fn reset(&self, session: &mut ResetSession) -> Result<(), ResetError> {
        let clock = self.deps.clock;
        let generator = PasswordGenerator::new(self.options.password_length)?;

        session.enter(ResetState::TriggerReset, clock.now());
        let deadline = Deadline::start(clock.now(), self.options.automation_timeout);
        session.set_credential(generator.generate());
        self.check_deadline(&deadline)?;

        let mut browser = SessionGuard::new(self.deps.browser.launch(&self.account.email)?);
        let result = self.drive(session, &deadline, &generator, &mut browser);

        if result.is_err() {
            if let Ok(page) = browser.session() {
                page.capture_diagnostics(&format!(
                    "{}-{}",
                    self.account.name,
                    session.state().as_str().to_lowercase()
                ));
            }
        }
        browser.release();
        result
    }

    fn drive(
        &self,
        session: &mut ResetSession,
        deadline: &Deadline,
        generator: &PasswordGenerator,
        browser: &mut SessionGuard,
    ) -> Result<(), ResetError> {
        let clock = self.deps.clock;
        let account = &self.account;

        self.step(deadline, browser, |page| page.open_login(&account.account_id))?;
        let since = clock.now();
        session.mark_triggered(since);
        self.step(deadline, browser, |page| {
            page.trigger_forgot_password(&account.email)
        })?;

        session.enter(ResetState::AwaitEmail, clock.now());
        let link = self.await_email(deadline, since)?;

        let max_attempts = self.options.max_submit_attempts.max(1);
        loop {
            session.enter(ResetState::ConsumeLink, clock.now());
            self.step(deadline, browser, |page| page.open_reset_link(&link.url))?;

            session.enter(ResetState::SubmitPassword, clock.now());
            let credential = session
                .credential()
                .ok_or_else(|| ResetError::Config("no credential generated".to_string()))?;
            match self.step(deadline, browser, |page| page.submit_new_password(credential)) {
                Ok(()) => break,
                Err(ResetError::CredentialRejected { last, .. }) => {
                    let attempts = session.attempts(ResetState::SubmitPassword);
                    if attempts >= max_attempts {
                        return Err(ResetError::CredentialRejected { attempts, last });
                    }
                    warn!(
                        "[{}] credential rejected ({}), regenerating (attempt {}/{})",
                        account.name,
                        last,
                        attempts + 1,
                        max_attempts
                    );
                    session.set_credential(generator.generate());
                }
                Err(e) => return Err(e),
            }
        }

        session.enter(ResetState::Verify, clock.now());
        let credential = session
            .credential()
            .ok_or_else(|| ResetError::Config("no credential generated".to_string()))?;
        let verified = self.step(deadline, browser, |page| {
            page.verify_login(&account.account_id, credential)
        })?;
        if !verified {
            return Err(ResetError::VerificationFailed);
        }
        Ok(())
    }

    fn await_email(
        &self,
        deadline: &Deadline,
        since: DateTime<Utc>,
    ) -> Result<ResetLink, ResetError> {
        self.check_deadline(deadline)?;
        let remaining = deadline.remaining(self.deps.clock.now());
        let budget = self.options.wait_for_email.min(remaining);

        match self.deps.retriever.fetch_reset_link(
            self.deps.mailbox,
            self.deps.clock,
            &self.account.email,
            since,
            budget,
        ) {
            Ok(link) => Ok(link),
            // The session deadline cut the wait short
            Err(EmailError::Timeout(_)) if budget < self.options.wait_for_email => {
                Err(ResetError::AutomationTimeout(self.options.automation_timeout))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// One browser operation under the step timeout, capped by what is
    /// left of the session deadline
    fn step<T>(
        &self,
        deadline: &Deadline,
        browser: &mut SessionGuard,
        operation: impl FnOnce(&mut dyn BrowserSession) -> Result<T, BrowserError>,
    ) -> Result<T, ResetError> {
        self.check_deadline(deadline)?;
        let remaining = deadline.remaining(self.deps.clock.now());
        let page = browser.session()?;
        page.set_step_timeout(self.options.step_timeout.min(remaining));

        operation(page).map_err(|error| {
            if deadline.is_expired(self.deps.clock.now()) {
                ResetError::AutomationTimeout(self.options.automation_timeout)
            } else {
                error.into()
            }
        })
    }

    fn check_deadline(&self, deadline: &Deadline) -> Result<(), ResetError> {
        if self.deps.interrupted.load(Ordering::SeqCst) {
            return Err(ResetError::Interrupted);
        }
        if deadline.is_expired(self.deps.clock.now()) {
            return Err(ResetError::AutomationTimeout(self.options.automation_timeout));
        }
        Ok(())
    }
}
