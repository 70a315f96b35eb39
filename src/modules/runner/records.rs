use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::modules::reset::{Account, ErrorKind};
use crate::modules::store::{SecretRecord, SecretStore, StatusState, StoreError};
use crate::modules::utils::logging::log_store_operation;

/// Create the account's record unless one already exists.
/// Returns whether a record was created.
pub fn init_record(store: &dyn SecretStore, account: &Account) -> Result<bool, StoreError> {
    let record = SecretRecord::provisioned(&account.account_id, &account.email, &account.login_url());
    let created = store.create_if_absent(&account.secret_id, &record)?;
    if !created {
        log_store_operation("init", &account.secret_id, true, Some("already present"));
    }
    Ok(created)
}

/// Record state for one account, without the credential
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub account: String,
    pub secret_id: String,
    pub exists: bool,
    pub password_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_set_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_state: Option<StatusState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reason: Option<String>,
}

pub fn record_status(
    store: &dyn SecretStore,
    accounts: &[Account],
) -> Result<Vec<RecordSummary>, StoreError> {
    accounts
        .iter()
        .map(|account| {
            let record = store.read(&account.secret_id)?;
            let status = record.as_ref().and_then(|r| r.last_status.clone());
            Ok(RecordSummary {
                account: account.name.clone(),
                secret_id: account.secret_id.clone(),
                exists: record.is_some(),
                password_set: record.as_ref().map_or(false, |r| r.password_set),
                password_set_at: record.as_ref().and_then(|r| r.password_set_at),
                last_state: status.as_ref().map(|s| s.state),
                last_kind: status.as_ref().and_then(|s| s.kind),
                last_reason: status.and_then(|s| s.reason),
            })
        })
        .collect()
}
