use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use std::time::Duration;

use super::error::ErrorKind;
use super::session::{ResetState, StateTransition};
use crate::modules::utils::time::format_timestamp;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeStatus {
    Succeeded,
    Skipped,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Succeeded => "succeeded",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Failed => "failed",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FailureSummary {
    pub kind: ErrorKind,
    pub reason: String,
}

/// Result of one account's reset. Carries the credential only on success,
/// and only as far as the reconciler.
pub struct ResetOutcome {
    pub account_name: String,
    pub account_id: String,
    pub secret_id: String,
    pub status: OutcomeStatus,
    pub credential: Option<SecretString>,
    pub failure: Option<FailureSummary>,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
    pub transitions: Vec<StateTransition>,
}

impl ResetOutcome {
    pub fn is_failure(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }

    pub fn reason(&self) -> String {
        match (&self.status, &self.failure) {
            (OutcomeStatus::Skipped, _) => "skipped: password already set".to_string(),
            (OutcomeStatus::Succeeded, _) => "password reset and verified".to_string(),
            (OutcomeStatus::Failed, Some(failure)) => failure.reason.clone(),
            (OutcomeStatus::Failed, None) => "failed".to_string(),
        }
    }

    /// Deepest stage the session reached before finishing
    pub fn last_stage(&self) -> Option<ResetState> {
        self.transitions
            .iter()
            .rev()
            .map(|t| t.state)
            .find(|state| !state.is_terminal())
    }

    pub fn report(&self) -> OutcomeReport {
        OutcomeReport {
            account: self.account_name.clone(),
            account_id: self.account_id.clone(),
            status: self.status,
            kind: self.failure.as_ref().map(|f| f.kind),
            reason: self.reason(),
            last_stage: self.last_stage().map(|s| s.as_str().to_string()),
            elapsed_seconds: self.elapsed.as_secs_f64(),
            finished_at: format_timestamp(self.finished_at),
        }
    }
}

impl std::fmt::Debug for ResetOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetOutcome")
            .field("account_name", &self.account_name)
            .field("status", &self.status)
            .field("failure", &self.failure)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

/// Credential-free view of an outcome for logs and run output
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutcomeReport {
    pub account: String,
    pub account_id: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_stage: Option<String>,
    pub elapsed_seconds: f64,
    pub finished_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn outcome(status: OutcomeStatus) -> ResetOutcome {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        ResetOutcome {
            account_name: "prod".to_string(),
            account_id: "123456789012".to_string(),
            secret_id: "aws/root/prod".to_string(),
            status,
            credential: Some(SecretString::from("Never-Printed-Cred1!".to_string())),
            failure: None,
            elapsed: Duration::from_secs(42),
            finished_at: at,
            transitions: vec![
                StateTransition {
                    state: ResetState::Init,
                    at,
                },
                StateTransition {
                    state: ResetState::Verify,
                    at,
                },
                StateTransition {
                    state: ResetState::Done,
                    at,
                },
            ],
        }
    }

    #[test]
    fn test_report_never_contains_credential() {
        let outcome = outcome(OutcomeStatus::Succeeded);
        let json = serde_json::to_string(&outcome.report()).unwrap();
        assert!(!json.contains("Never-Printed-Cred1!"));
        assert!(!format!("{:?}", outcome).contains("Never-Printed-Cred1!"));
        assert!(json.contains("\"status\":\"succeeded\""));
        assert!(json.contains("\"last_stage\":\"VERIFY\""));
        assert!(!json.contains("\"kind\""));
    }

    #[test]
    fn test_failed_report_carries_kind() {
        let mut outcome = outcome(OutcomeStatus::Failed);
        outcome.credential = None;
        outcome.failure = Some(FailureSummary {
            kind: ErrorKind::Timeout,
            reason: "email not received within budget (2m 0s)".to_string(),
        });
        let report = outcome.report();
        assert_eq!(report.kind, Some(ErrorKind::Timeout));
        assert!(report.reason.starts_with("email not received"));
        assert!(outcome.is_failure());
    }

    #[test]
    fn test_skipped_reason() {
        assert_eq!(
            outcome(OutcomeStatus::Skipped).reason(),
            "skipped: password already set"
        );
    }
}
