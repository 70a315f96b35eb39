use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::modules::reset::ErrorKind;

/// Result of the latest reset attempt recorded against an account
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum StatusState {
    Succeeded,
    Failed,
}

/// Status field kept apart from the credential so failures never touch it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordStatus {
    pub state: StatusState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Per-account record in the secret store
#[derive(Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SecretRecord {
    pub account_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub login_url: String,
    #[serde(default)]
    pub password_set: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_set_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<RecordStatus>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

// Keep the credential out of logs and panic messages
impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("login_url", &self.login_url)
            .field("password_set", &self.password_set)
            .field("password_set_at", &self.password_set_at)
            .field("last_status", &self.last_status)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// The only field changes a reset run may make to a record
#[derive(Clone, PartialEq)]
pub enum RecordUpdate {
    /// Verified new credential
    PasswordSet {
        password: String,
        at: DateTime<Utc>,
    },
    /// Failed attempt; credential and `password_set` stay as they were
    AttemptFailed {
        kind: ErrorKind,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl std::fmt::Debug for RecordUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordUpdate::PasswordSet { at, .. } => write!(f, "PasswordSet {{ at: {} }}", at),
            RecordUpdate::AttemptFailed { kind, reason, at } => write!(
                f,
                "AttemptFailed {{ kind: {}, reason: {:?}, at: {} }}",
                kind, reason, at
            ),
        }
    }
}

impl SecretRecord {
    /// Fresh record as the provisioning step creates it
    pub fn provisioned(account_id: &str, email: &str, login_url: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            email: email.to_string(),
            login_url: login_url.to_string(),
            ..Self::default()
        }
    }

    pub fn apply(&mut self, update: &RecordUpdate) {
        match update {
            RecordUpdate::PasswordSet { password, at } => {
                self.password = Some(password.clone());
                self.password_set = true;
                self.password_set_at = Some(*at);
                self.last_status = Some(RecordStatus {
                    state: StatusState::Succeeded,
                    kind: None,
                    reason: None,
                    at: *at,
                });
            }
            RecordUpdate::AttemptFailed { kind, reason, at } => {
                self.last_status = Some(RecordStatus {
                    state: StatusState::Failed,
                    kind: Some(*kind),
                    reason: Some(reason.clone()),
                    at: *at,
                });
            }
        }
    }
}
