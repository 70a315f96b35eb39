mod file;
mod keyring_store;
#[cfg(test)]
pub(crate) mod memory;
pub mod reconciler;
pub mod record;

use std::io;

pub use self::file::FileSecretStore;
pub use self::keyring_store::KeyringSecretStore;
pub use reconciler::ResultReconciler;
pub use record::{RecordStatus, RecordUpdate, SecretRecord, StatusState};

/// Errors from the secret store backend
#[derive(Debug)]
pub enum StoreError {
    /// Backend cannot be reached at all; aborts the whole run
    Unavailable(String),
    NotFound(String),
    Corrupt(String),
    IoError(io::Error),
}

impl From<io::Error> for StoreError {
    fn from(error: io::Error) -> Self {
        StoreError::IoError(error)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Secret store unavailable: {}", msg),
            StoreError::NotFound(msg) => write!(f, "Secret record not found: {}", msg),
            StoreError::Corrupt(msg) => write!(f, "Secret record unreadable: {}", msg),
            StoreError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Per-account secret records.
///
/// Each write replaces one record as a whole, so a concurrent reader sees
/// either the old or the new record, never a mix.
pub trait SecretStore: Send + Sync {
    fn read(&self, secret_id: &str) -> Result<Option<SecretRecord>, StoreError>;

    /// Create the record unless one exists; returns whether it was created
    fn create_if_absent(&self, secret_id: &str, record: &SecretRecord)
        -> Result<bool, StoreError>;

    /// Merge `update` into the existing record and persist it
    fn apply(&self, secret_id: &str, update: &RecordUpdate) -> Result<SecretRecord, StoreError>;
}
