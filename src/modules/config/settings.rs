use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ConfigError;
use crate::modules::browser::ChromeOptions;
use crate::modules::email::{supported_providers, template_for, ImapCredentialStore, ImapEndpoint};
use crate::modules::reset::{Account, ResetOptions};
use crate::modules::store::{FileSecretStore, KeyringSecretStore, SecretStore};
use crate::{
    DEFAULT_AUTOMATION_TIMEOUT_SECS, DEFAULT_MAX_SUBMIT_ATTEMPTS, DEFAULT_PASSWORD_LENGTH,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_STEP_TIMEOUT_SECS, DEFAULT_WAIT_FOR_EMAIL_SECS,
    MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH,
};

/// Shared reset inbox
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EmailSettings {
    pub provider: String,
    pub imap_server: String,
    pub imap_port: u16,
    pub tls: bool,
    pub username: String,
    /// Keyring entry holding the mailbox password
    pub password_secret: String,
    pub mailbox: String,
    pub poll_interval_seconds: u64,
    pub max_messages_per_poll: usize,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            provider: "aws".to_string(),
            imap_server: String::new(),
            imap_port: 993,
            tls: true,
            username: String::new(),
            password_secret: "default".to_string(),
            mailbox: "INBOX".to_string(),
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            max_messages_per_poll: 10,
        }
    }
}

/// What to do with remaining accounts once one fails
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    Continue,
    Stop,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AutomationSettings {
    pub headless: bool,
    pub wait_for_email_seconds: u64,
    pub automation_timeout_seconds: u64,
    pub step_timeout_seconds: u64,
    pub max_submit_attempts: u32,
    pub password_length: usize,
    pub workers: usize,
    pub on_failure: FailurePolicy,
    pub force_reset: bool,
    pub skip_mfa: bool,
    pub chrome_path: Option<PathBuf>,
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            headless: true,
            wait_for_email_seconds: DEFAULT_WAIT_FOR_EMAIL_SECS,
            automation_timeout_seconds: DEFAULT_AUTOMATION_TIMEOUT_SECS,
            step_timeout_seconds: DEFAULT_STEP_TIMEOUT_SECS,
            max_submit_attempts: DEFAULT_MAX_SUBMIT_ATTEMPTS,
            password_length: DEFAULT_PASSWORD_LENGTH,
            workers: 1,
            on_failure: FailurePolicy::Continue,
            force_reset: false,
            skip_mfa: false,
            chrome_path: None,
            screenshot_dir: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Keyring,
    File,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Record directory for the file backend
    pub directory: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Keyring,
            directory: None,
        }
    }
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub headless: Option<bool>,
    pub wait_for_email_seconds: Option<u64>,
    pub automation_timeout_seconds: Option<u64>,
    pub workers: Option<usize>,
    pub force_reset: bool,
    pub skip_mfa: bool,
    pub fail_fast: bool,
    /// Reset only this account instead of the configured list
    pub account: Option<Account>,
}

/// Whole run configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub email: EmailSettings,
    pub automation: AutomationSettings,
    pub store: StoreSettings,
    pub accounts: Vec<Account>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        let automation = &mut self.automation;
        if let Some(headless) = overrides.headless {
            automation.headless = headless;
        }
        if let Some(seconds) = overrides.wait_for_email_seconds {
            automation.wait_for_email_seconds = seconds;
        }
        if let Some(seconds) = overrides.automation_timeout_seconds {
            automation.automation_timeout_seconds = seconds;
        }
        if let Some(workers) = overrides.workers {
            automation.workers = workers;
        }
        automation.force_reset |= overrides.force_reset;
        automation.skip_mfa |= overrides.skip_mfa;
        if overrides.fail_fast {
            automation.on_failure = FailurePolicy::Stop;
        }
        if let Some(account) = overrides.account {
            self.accounts = vec![account];
        }
    }

    /// Account list checks, shared by every subcommand
    pub fn validate_accounts(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::Invalid("no accounts configured".to_string()));
        }
        let mut names = HashSet::new();
        for account in &self.accounts {
            account.validate().map_err(ConfigError::Invalid)?;
            if !names.insert(account.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate account name '{}'",
                    account.name
                )));
            }
        }
        Ok(())
    }

    /// Everything that must hold before any session opens
    pub fn validate(&self) -> Result<(), ConfigError> {
        let automation = &self.automation;
        self.validate_accounts()?;

        if self.email.imap_server.trim().is_empty() {
            return Err(ConfigError::Invalid("email.imap_server is required".to_string()));
        }
        if self.email.username.trim().is_empty() {
            return Err(ConfigError::Invalid("email.username is required".to_string()));
        }
        if template_for(&self.email.provider).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unsupported email provider '{}' (supported: {})",
                self.email.provider,
                supported_providers().join(", ")
            )));
        }
        if self.email.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "email.poll_interval_seconds must be positive".to_string(),
            ));
        }

        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&automation.password_length) {
            return Err(ConfigError::Invalid(format!(
                "automation.password_length must be between {} and {}",
                MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
            )));
        }
        for (name, value) in [
            ("wait_for_email_seconds", automation.wait_for_email_seconds),
            ("automation_timeout_seconds", automation.automation_timeout_seconds),
            ("step_timeout_seconds", automation.step_timeout_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "automation.{} must be positive",
                    name
                )));
            }
        }
        if automation.step_timeout_seconds > automation.automation_timeout_seconds {
            return Err(ConfigError::Invalid(
                "automation.step_timeout_seconds exceeds the automation timeout".to_string(),
            ));
        }
        if automation.max_submit_attempts == 0 {
            return Err(ConfigError::Invalid(
                "automation.max_submit_attempts must be at least 1".to_string(),
            ));
        }
        if automation.workers == 0 {
            return Err(ConfigError::Invalid("automation.workers must be at least 1".to_string()));
        }

        if self.store.backend == StoreBackend::File && self.store.directory.is_none() {
            return Err(ConfigError::Invalid(
                "store.directory is required for the file backend".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reset_options(&self) -> ResetOptions {
        let automation = &self.automation;
        ResetOptions {
            force_reset: automation.force_reset,
            wait_for_email: Duration::from_secs(automation.wait_for_email_seconds),
            automation_timeout: Duration::from_secs(automation.automation_timeout_seconds),
            step_timeout: Duration::from_secs(automation.step_timeout_seconds),
            max_submit_attempts: automation.max_submit_attempts,
            password_length: automation.password_length,
        }
    }

    pub fn imap_endpoint(&self) -> ImapEndpoint {
        ImapEndpoint {
            server: self.email.imap_server.clone(),
            port: self.email.imap_port,
            tls: self.email.tls,
            username: self.email.username.clone(),
            mailbox: self.email.mailbox.clone(),
        }
    }

    pub fn chrome_options(&self) -> ChromeOptions {
        ChromeOptions {
            headless: self.automation.headless,
            chrome_path: self.automation.chrome_path.clone(),
            skip_mfa: self.automation.skip_mfa,
            screenshot_dir: self.automation.screenshot_dir.clone(),
            idle_timeout: Duration::from_secs(self.automation.automation_timeout_seconds),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.automation.step_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.email.poll_interval_seconds)
    }

    pub fn open_store(&self) -> Result<Box<dyn SecretStore>, ConfigError> {
        match self.store.backend {
            StoreBackend::Keyring => Ok(Box::new(KeyringSecretStore::new())),
            StoreBackend::File => {
                let directory = self.store.directory.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("store.directory is required".to_string())
                })?;
                let store = FileSecretStore::new(directory)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                Ok(Box::new(store))
            }
        }
    }

    /// Mailbox password from the environment if given, else from the keyring
    pub fn imap_password(&self, from_env: Option<String>) -> Result<SecretString, ConfigError> {
        if let Some(password) = from_env.filter(|p| !p.is_empty()) {
            return Ok(SecretString::from(password));
        }
        let store = ImapCredentialStore::new(&self.email.password_secret)
            .map_err(ConfigError::Secret)?;
        store.get_password(&self.email.username).map_err(|e| {
            ConfigError::Secret(format!(
                "{} (run store-imap-credentials or set ROOT_RESET_IMAP_PASSWORD)",
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"{
        "email": {
            "imap_server": "imap.example.com",
            "username": "aws-root@example.com",
            "password_secret": "shared-inbox"
        },
        "automation": {
            "wait_for_email_seconds": 90,
            "on_failure": "stop"
        },
        "accounts": [
            {
                "name": "prod",
                "account_id": "123456789012",
                "email": "aws-prod@example.com",
                "secret_id": "aws/root/prod"
            },
            {
                "name": "staging",
                "account_id": "210987654321",
                "email": "aws-staging@example.com",
                "secret_id": "aws/root/staging"
            }
        ]
    }"#;

    fn settings() -> Settings {
        Settings::from_json(CONFIG).unwrap()
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings = settings();
        assert_eq!(settings.email.imap_port, 993);
        assert!(settings.email.tls);
        assert_eq!(settings.email.mailbox, "INBOX");
        assert_eq!(settings.automation.wait_for_email_seconds, 90);
        assert_eq!(settings.automation.automation_timeout_seconds, 600);
        assert_eq!(settings.automation.password_length, 32);
        assert_eq!(settings.automation.on_failure, FailurePolicy::Stop);
        assert_eq!(settings.store.backend, StoreBackend::Keyring);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let loaded = Settings::load(file.path()).unwrap();
        assert_eq!(loaded, settings());

        assert!(matches!(
            Settings::load(Path::new("/nonexistent/config.json")),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Settings::from_json("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut settings = settings();
        settings.apply_overrides(Overrides {
            headless: Some(false),
            wait_for_email_seconds: Some(30),
            workers: Some(4),
            force_reset: true,
            ..Overrides::default()
        });

        assert!(!settings.automation.headless);
        assert_eq!(settings.automation.wait_for_email_seconds, 30);
        assert_eq!(settings.automation.workers, 4);
        assert!(settings.automation.force_reset);
        assert_eq!(settings.accounts.len(), 2);

        let options = settings.reset_options();
        assert!(options.force_reset);
        assert_eq!(options.wait_for_email, Duration::from_secs(30));
    }

    #[test]
    fn test_single_account_override_replaces_list() {
        let mut settings = settings();
        let account = Account {
            name: "sandbox".to_string(),
            account_id: "111122223333".to_string(),
            email: "aws-sandbox@example.com".to_string(),
            secret_id: "aws/root/sandbox".to_string(),
        };
        settings.apply_overrides(Overrides {
            account: Some(account.clone()),
            ..Overrides::default()
        });
        assert_eq!(settings.accounts, vec![account]);
    }

    #[test]
    fn test_validation_rejects_bad_inputs() {
        let mut bad = settings();
        bad.accounts[1].name = "prod".to_string();
        assert!(bad.validate().unwrap_err().to_string().contains("duplicate"));

        let mut bad = settings();
        bad.accounts[0].account_id = "1234".to_string();
        assert!(bad.validate().is_err());

        let mut bad = settings();
        bad.automation.password_length = 12;
        assert!(bad.validate().is_err());

        let mut bad = settings();
        bad.automation.step_timeout_seconds = 700;
        assert!(bad.validate().is_err());

        let mut bad = settings();
        bad.automation.wait_for_email_seconds = 0;
        assert!(bad.validate().is_err());

        let mut bad = settings();
        bad.email.imap_server = String::new();
        assert!(bad.validate().is_err());

        let mut bad = settings();
        bad.email.provider = "gmail".to_string();
        assert!(bad.validate().is_err());

        let mut bad = settings();
        bad.store.backend = StoreBackend::File;
        assert!(bad.validate().is_err());

        let mut bad = settings();
        bad.accounts.clear();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_env_password_wins() {
        let password = settings()
            .imap_password(Some("from-env-secret".to_string()))
            .unwrap();
        assert_eq!(password.expose_secret(), "from-env-secret");
    }

    #[test]
    fn test_endpoint_and_browser_options() {
        let settings = settings();
        let endpoint = settings.imap_endpoint();
        assert_eq!(endpoint.server, "imap.example.com");
        assert_eq!(endpoint.port, 993);
        assert_eq!(endpoint.username, "aws-root@example.com");

        let chrome = settings.chrome_options();
        assert!(chrome.headless);
        assert!(!chrome.skip_mfa);
    }
}
