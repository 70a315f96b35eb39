use chrono::{DateTime, Utc};
use log::{error, warn};
use secrecy::SecretString;
use serde::Serialize;
use std::collections::BTreeMap;

use super::account::Account;
use super::error::ResetError;
use super::outcome::{FailureSummary, OutcomeStatus, ResetOutcome};
use crate::modules::utils::logging::log_reset_event;
use crate::modules::utils::time::elapsed_between;

/// Stages of one account's reset
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetState {
    Init,
    CheckIdempotent,
    TriggerReset,
    AwaitEmail,
    ConsumeLink,
    SubmitPassword,
    Verify,
    Done,
    Failed,
}

impl ResetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetState::Init => "INIT",
            ResetState::CheckIdempotent => "CHECK_IDEMPOTENT",
            ResetState::TriggerReset => "TRIGGER_RESET",
            ResetState::AwaitEmail => "AWAIT_EMAIL",
            ResetState::ConsumeLink => "CONSUME_LINK",
            ResetState::SubmitPassword => "SUBMIT_PASSWORD",
            ResetState::Verify => "VERIFY",
            ResetState::Done => "DONE",
            ResetState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResetState::Done | ResetState::Failed)
    }
}

impl std::fmt::Display for ResetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub state: ResetState,
    pub at: DateTime<Utc>,
}

/// Transient per-account state; owned by one worker and never persisted
pub struct ResetSession {
    account: Account,
    state: ResetState,
    credential: Option<SecretString>,
    attempts: BTreeMap<ResetState, u32>,
    error: Option<ResetError>,
    skipped: bool,
    started_at: DateTime<Utc>,
    triggered_at: Option<DateTime<Utc>>,
    transitions: Vec<StateTransition>,
}

impl ResetSession {
    pub fn new(account: Account, now: DateTime<Utc>) -> Self {
        let mut session = Self {
            account,
            state: ResetState::Init,
            credential: None,
            attempts: BTreeMap::new(),
            error: None,
            skipped: false,
            started_at: now,
            triggered_at: None,
            transitions: Vec::new(),
        };
        session.record(ResetState::Init, now);
        session
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn state(&self) -> ResetState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// How many times the session has entered `state`
    pub fn attempts(&self, state: ResetState) -> u32 {
        self.attempts.get(&state).copied().unwrap_or(0)
    }

    /// Move to a non-terminal state. Terminal sessions stay where they are.
    pub fn enter(&mut self, state: ResetState, now: DateTime<Utc>) {
        if self.state.is_terminal() {
            warn!(
                "[{}] ignoring transition to {} after {}",
                self.account.name, state, self.state
            );
            return;
        }
        self.record(state, now);
        log_reset_event(state.as_str(), &self.account.name, true, None);
    }

    fn record(&mut self, state: ResetState, now: DateTime<Utc>) {
        self.state = state;
        *self.attempts.entry(state).or_insert(0) += 1;
        self.transitions.push(StateTransition { state, at: now });
    }

    /// Install the credential for the next submission, replacing any rejected one
    pub fn set_credential(&mut self, credential: SecretString) {
        self.credential = Some(credential);
    }

    pub fn credential(&self) -> Option<&SecretString> {
        self.credential.as_ref()
    }

    pub fn mark_triggered(&mut self, at: DateTime<Utc>) {
        self.triggered_at = Some(at);
    }

    pub fn triggered_at(&self) -> Option<DateTime<Utc>> {
        self.triggered_at
    }

    pub fn skip(&mut self, now: DateTime<Utc>) {
        self.skipped = true;
        self.credential = None;
        self.enter(ResetState::Done, now);
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.enter(ResetState::Done, now);
    }

    pub fn fail(&mut self, error: ResetError, now: DateTime<Utc>) {
        if self.state.is_terminal() {
            return;
        }
        let at_stage = self.state;
        log_reset_event(
            at_stage.as_str(),
            &self.account.name,
            false,
            Some(&error.to_string()),
        );
        error!(
            "[{}] reset failed during {}: {}",
            self.account.name, at_stage, error
        );
        self.credential = None;
        self.error = Some(error);
        self.record(ResetState::Failed, now);
    }

    /// Consume the session into its externally visible result
    pub fn into_outcome(self, now: DateTime<Utc>) -> ResetOutcome {
        let status = match (self.state, self.skipped) {
            (ResetState::Done, true) => OutcomeStatus::Skipped,
            (ResetState::Done, false) => OutcomeStatus::Succeeded,
            _ => OutcomeStatus::Failed,
        };
        let failure = match (&self.error, status) {
            (Some(error), OutcomeStatus::Failed) => Some(FailureSummary {
                kind: error.kind(),
                reason: error.to_string(),
            }),
            _ => None,
        };
        let credential = match status {
            OutcomeStatus::Succeeded => self.credential,
            _ => None,
        };

        ResetOutcome {
            account_name: self.account.name,
            account_id: self.account.account_id,
            secret_id: self.account.secret_id,
            status,
            credential,
            failure,
            elapsed: elapsed_between(self.started_at, now),
            finished_at: now,
            transitions: self.transitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::reset::ErrorKind;
    use chrono::TimeZone;
    use secrecy::ExposeSecret;
    use std::time::Duration;

    fn account() -> Account {
        Account {
            name: "prod".to_string(),
            account_id: "123456789012".to_string(),
            email: "root@example.com".to_string(),
            secret_id: "aws/root/prod".to_string(),
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut session = ResetSession::new(account(), at(0));
        session.enter(ResetState::CheckIdempotent, at(1));
        session.fail(ResetError::VerificationFailed, at(2));

        session.enter(ResetState::Verify, at(3));
        session.complete(at(4));
        session.fail(ResetError::Interrupted, at(5));

        assert_eq!(session.state(), ResetState::Failed);
        let outcome = session.into_outcome(at(6));
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(
            outcome.failure.unwrap().kind,
            ErrorKind::VerificationFailed
        );
    }

    #[test]
    fn test_credential_only_surfaces_on_success() {
        let mut session = ResetSession::new(account(), at(0));
        session.set_credential(SecretString::from("Generated-Cred-1!".to_string()));
        session.complete(at(30));
        let outcome = session.into_outcome(at(30));
        assert_eq!(outcome.status, OutcomeStatus::Succeeded);
        assert_eq!(
            outcome.credential.unwrap().expose_secret(),
            "Generated-Cred-1!"
        );
        assert_eq!(outcome.elapsed, Duration::from_secs(30));

        let mut session = ResetSession::new(account(), at(0));
        session.set_credential(SecretString::from("Generated-Cred-1!".to_string()));
        session.fail(ResetError::EmailTimeout(Duration::from_secs(120)), at(130));
        assert!(session.into_outcome(at(130)).credential.is_none());
    }

    #[test]
    fn test_transitions_and_attempt_counts() {
        let mut session = ResetSession::new(account(), at(0));
        session.enter(ResetState::ConsumeLink, at(1));
        session.enter(ResetState::SubmitPassword, at(2));
        session.enter(ResetState::ConsumeLink, at(3));
        session.enter(ResetState::SubmitPassword, at(4));

        assert_eq!(session.attempts(ResetState::SubmitPassword), 2);
        assert_eq!(session.attempts(ResetState::Verify), 0);
        let states: Vec<ResetState> = session.transitions().iter().map(|t| t.state).collect();
        assert_eq!(
            states,
            vec![
                ResetState::Init,
                ResetState::ConsumeLink,
                ResetState::SubmitPassword,
                ResetState::ConsumeLink,
                ResetState::SubmitPassword,
            ]
        );
    }

    #[test]
    fn test_skip_reports_skipped() {
        let mut session = ResetSession::new(account(), at(0));
        session.enter(ResetState::CheckIdempotent, at(0));
        session.skip(at(1));
        let outcome = session.into_outcome(at(1));
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert!(outcome.failure.is_none());
        assert!(outcome.credential.is_none());
    }
}
