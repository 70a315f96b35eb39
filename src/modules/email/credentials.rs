use chrono::{DateTime, Utc};
use keyring::Entry;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::KEYRING_SERVICE;

/// Mailbox password with metadata, as kept in the system keyring
#[derive(Serialize, Deserialize)]
struct StoredImapPassword {
    username: String,
    password: String,
    last_updated: DateTime<Utc>,
}

/// Keyring-backed storage for the shared reset inbox password
pub struct ImapCredentialStore {
    keyring: Entry,
}

impl ImapCredentialStore {
    /// Open the keyring entry named by the configured `password_secret`
    pub fn new(secret_name: &str) -> Result<Self, String> {
        let keyring = Entry::new(KEYRING_SERVICE, &format!("imap/{}", secret_name))
            .map_err(|e| format!("Failed to open keyring entry: {}", e))?;
        Ok(Self { keyring })
    }

    pub fn is_initialized(&self) -> bool {
        self.keyring.get_password().is_ok()
    }

    /// Store the mailbox password in the system keyring
    pub fn store_password(&self, username: &str, password: &str) -> Result<(), String> {
        let stored = StoredImapPassword {
            username: username.to_string(),
            password: password.to_string(),
            last_updated: Utc::now(),
        };

        let json = serde_json::to_string(&stored)
            .map_err(|e| format!("Failed to serialize credentials: {}", e))?;

        self.keyring
            .set_password(&json)
            .map_err(|e| format!("Failed to store credentials: {}", e))
    }

    /// Retrieve the password stored for `username`
    pub fn get_password(&self, username: &str) -> Result<SecretString, String> {
        let json = self
            .keyring
            .get_password()
            .map_err(|e| format!("Failed to retrieve credentials: {}", e))?;

        let stored: StoredImapPassword = serde_json::from_str(&json)
            .map_err(|e| format!("Failed to parse credentials: {}", e))?;

        if !stored.username.eq_ignore_ascii_case(username) {
            return Err(format!(
                "Stored mailbox credentials belong to a different user (updated {})",
                stored.last_updated.format("%Y-%m-%d")
            ));
        }
        Ok(SecretString::from(stored.password))
    }

    pub fn delete(&self) -> Result<(), String> {
        self.keyring
            .delete_password()
            .map_err(|e| format!("Failed to delete credentials: {}", e))
    }
}
