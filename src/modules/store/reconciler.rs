use log::{error, info, warn};
use secrecy::ExposeSecret;

use super::{RecordUpdate, SecretRecord, SecretStore, StoreError};
use crate::modules::reset::{ErrorKind, OutcomeStatus, ResetOutcome};
use crate::modules::utils::logging::log_store_operation;

/// Writes a finished session's outcome back to its secret record
pub struct ResultReconciler<'a> {
    store: &'a dyn SecretStore,
}

impl<'a> ResultReconciler<'a> {
    pub fn new(store: &'a dyn SecretStore) -> Self {
        Self { store }
    }

    /// Persist `outcome`. Returns the record as written, or `None` when
    /// nothing was written. Only an unreachable store is an error here.
    pub fn reconcile(&self, outcome: &ResetOutcome) -> Result<Option<SecretRecord>, StoreError> {
        let update = match outcome.status {
            OutcomeStatus::Skipped => return Ok(None),
            OutcomeStatus::Succeeded => match &outcome.credential {
                Some(credential) => RecordUpdate::PasswordSet {
                    password: credential.expose_secret().to_string(),
                    at: outcome.finished_at,
                },
                None => {
                    error!(
                        "[{}] successful outcome without a credential, not writing",
                        outcome.account_name
                    );
                    return Ok(None);
                }
            },
            OutcomeStatus::Failed => RecordUpdate::AttemptFailed {
                kind: outcome
                    .failure
                    .as_ref()
                    .map(|f| f.kind)
                    .unwrap_or(ErrorKind::Config),
                reason: outcome.reason(),
                at: outcome.finished_at,
            },
        };

        match self.store.apply(&outcome.secret_id, &update) {
            Ok(record) => {
                info!(
                    "[{}] recorded {} in {}",
                    outcome.account_name,
                    outcome.status.as_str(),
                    outcome.secret_id
                );
                Ok(Some(record))
            }
            // A missing or damaged record was already reported as the account's failure
            Err(StoreError::NotFound(id)) if outcome.is_failure() => {
                warn!("[{}] no record at {} to mark failed", outcome.account_name, id);
                Ok(None)
            }
            Err(StoreError::Corrupt(msg)) if outcome.is_failure() => {
                warn!(
                    "[{}] record unreadable, failure not recorded: {}",
                    outcome.account_name, msg
                );
                Ok(None)
            }
            Err(e) => {
                log_store_operation("reconcile", &outcome.secret_id, false, Some(&e.to_string()));
                Err(e)
            }
        }
    }
}
