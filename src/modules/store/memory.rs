use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{RecordUpdate, SecretRecord, SecretStore, StoreError};

/// In-memory store that counts reads and writes
#[derive(Default)]
pub struct MemorySecretStore {
    records: Mutex<HashMap<String, SecretRecord>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    unavailable: AtomicBool,
    read_only: AtomicBool,
    corrupt: Mutex<HashSet<String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, secret_id: &str, record: SecretRecord) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(secret_id.to_string(), record);
        self
    }

    /// Reads of `secret_id` fail as if the stored JSON were damaged
    pub fn with_corrupt(self, secret_id: &str) -> Self {
        self.corrupt.lock().unwrap().insert(secret_id.to_string());
        self
    }

    /// Reads keep working, writes fail as unavailable
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn get(&self, secret_id: &str) -> Option<SecretRecord> {
        self.records.lock().unwrap().get(secret_id).cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        self.check_available()?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is read-only".to_string()));
        }
        Ok(())
    }

    fn check_readable(&self, secret_id: &str) -> Result<(), StoreError> {
        if self.corrupt.lock().unwrap().contains(secret_id) {
            return Err(StoreError::Corrupt(format!("{}: expected value", secret_id)));
        }
        Ok(())
    }
}

impl SecretStore for MemorySecretStore {
    fn read(&self, secret_id: &str) -> Result<Option<SecretRecord>, StoreError> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_readable(secret_id)?;
        Ok(self.get(secret_id))
    }

    fn create_if_absent(
        &self,
        secret_id: &str,
        record: &SecretRecord,
    ) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        if records.contains_key(secret_id) || self.corrupt.lock().unwrap().contains(secret_id) {
            return Ok(false);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        records.insert(secret_id.to_string(), record.clone());
        Ok(true)
    }

    fn apply(&self, secret_id: &str, update: &RecordUpdate) -> Result<SecretRecord, StoreError> {
        self.check_writable()?;
        self.check_readable(secret_id)?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(secret_id)
            .ok_or_else(|| StoreError::NotFound(secret_id.to_string()))?;
        record.apply(update);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record.clone())
    }
}
