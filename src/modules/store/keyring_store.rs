use keyring::Entry;

use super::{RecordUpdate, SecretRecord, SecretStore, StoreError};
use crate::modules::utils::logging::log_store_operation;
use crate::KEYRING_SERVICE;

/// Secret records kept as JSON in the system keyring, one entry per record
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
        }
    }

    fn entry(&self, secret_id: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service, &format!("record/{}", secret_id))
            .map_err(|e| StoreError::Unavailable(format!("Failed to open keyring entry: {}", e)))
    }

    fn write(&self, entry: &Entry, secret_id: &str, record: &SecretRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)
            .map_err(|e| StoreError::Corrupt(format!("Failed to serialize record: {}", e)))?;

        // A single set_password replaces the whole record at once
        let result = entry
            .set_password(&json)
            .map_err(|e| StoreError::Unavailable(format!("Failed to store record: {}", e)));
        log_store_operation("write", secret_id, result.is_ok(), None);
        result
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringSecretStore {
    fn read(&self, secret_id: &str) -> Result<Option<SecretRecord>, StoreError> {
        match self.entry(secret_id)?.get_password() {
            Ok(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", secret_id, e))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                log_store_operation("read", secret_id, false, Some(&e.to_string()));
                Err(StoreError::Unavailable(e.to_string()))
            }
        }
    }

    fn create_if_absent(
        &self,
        secret_id: &str,
        record: &SecretRecord,
    ) -> Result<bool, StoreError> {
        if self.read(secret_id)?.is_some() {
            return Ok(false);
        }
        let entry = self.entry(secret_id)?;
        self.write(&entry, secret_id, record)?;
        Ok(true)
    }

    fn apply(&self, secret_id: &str, update: &RecordUpdate) -> Result<SecretRecord, StoreError> {
        let mut record = self
            .read(secret_id)?
            .ok_or_else(|| StoreError::NotFound(secret_id.to_string()))?;
        record.apply(update);

        let entry = self.entry(secret_id)?;
        self.write(&entry, secret_id, &record)?;
        Ok(record)
    }
}
