use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{RecordUpdate, SecretRecord, SecretStore, StoreError};
use crate::modules::utils::logging::log_store_operation;

/// Secret records as JSON files, one per secret id, in a single directory
pub struct FileSecretStore {
    directory: PathBuf,
}

impl FileSecretStore {
    pub fn new(directory: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(directory).map_err(|e| {
            StoreError::Unavailable(format!("{}: {}", directory.display(), e))
        })?;
        Ok(Self {
            directory: directory.to_path_buf(),
        })
    }

    fn path_for(&self, secret_id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", file_stem(secret_id)))
    }

    /// Write to a temp file in the same directory, then rename over the target
    fn stage(&self, record: &SecretRecord) -> Result<NamedTempFile, StoreError> {
        let mut staged = NamedTempFile::new_in(&self.directory)?;
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::Corrupt(format!("Failed to serialize record: {}", e)))?;
        staged.write_all(&json)?;
        staged.as_file().sync_all()?;
        Ok(staged)
    }
}

/// Flatten a secret id to one file name, reversibly: every byte outside
/// `[A-Za-z0-9.-]` becomes `_XX`, so `aws/root/prod` and `aws_root_prod`
/// never share a file.
fn file_stem(secret_id: &str) -> String {
    let mut stem = String::with_capacity(secret_id.len());
    for byte in secret_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{:02X}", byte));
        }
    }
    stem
}

impl SecretStore for FileSecretStore {
    fn read(&self, secret_id: &str) -> Result<Option<SecretRecord>, StoreError> {
        let path = self.path_for(secret_id);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                log_store_operation("read", secret_id, false, Some(&e.to_string()));
                return Err(StoreError::IoError(e));
            }
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))
    }

    fn create_if_absent(
        &self,
        secret_id: &str,
        record: &SecretRecord,
    ) -> Result<bool, StoreError> {
        let staged = self.stage(record)?;
        match staged.persist_noclobber(self.path_for(secret_id)) {
            Ok(_) => {
                log_store_operation("create", secret_id, true, None);
                Ok(true)
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::IoError(e.error)),
        }
    }

    fn apply(&self, secret_id: &str, update: &RecordUpdate) -> Result<SecretRecord, StoreError> {
        let mut record = self
            .read(secret_id)?
            .ok_or_else(|| StoreError::NotFound(secret_id.to_string()))?;
        record.apply(update);

        let staged = self.stage(&record)?;
        staged
            .persist(self.path_for(secret_id))
            .map_err(|e| StoreError::IoError(e.error))?;
        log_store_operation("update", secret_id, true, None);
        Ok(record)
    }
}
