use serde::{Deserialize, Serialize};

use crate::modules::browser::SigninLayout;
use crate::modules::utils::io::is_valid_email;

/// One target account; immutable for the length of a run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    /// Human name used in logs and reports
    pub name: String,
    pub account_id: String,
    pub email: String,
    /// Where the account's secret record lives
    pub secret_id: String,
}

impl Account {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("account name is empty".to_string());
        }
        if !is_valid_account_id(&self.account_id) {
            return Err(format!(
                "{}: account id '{}' is not a 12-digit AWS account id",
                self.name, self.account_id
            ));
        }
        if !is_valid_email(&self.email) {
            return Err(format!("{}: invalid root email '{}'", self.name, self.email));
        }
        if self.secret_id.trim().is_empty() {
            return Err(format!("{}: secret reference is empty", self.name));
        }
        Ok(())
    }

    pub fn login_url(&self) -> String {
        SigninLayout::aws_root().login_url_for(&self.account_id)
    }
}

/// AWS account ids are exactly twelve ASCII digits
pub fn is_valid_account_id(account_id: &str) -> bool {
    account_id.len() == 12 && account_id.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            name: "prod".to_string(),
            account_id: "123456789012".to_string(),
            email: "aws-prod@example.com".to_string(),
            secret_id: "aws/root/prod".to_string(),
        }
    }

    #[test]
    fn test_account_id_format() {
        assert!(is_valid_account_id("123456789012"));
        assert!(is_valid_account_id("000000000001"));
        assert!(!is_valid_account_id("12345678901"));
        assert!(!is_valid_account_id("1234567890123"));
        assert!(!is_valid_account_id("12345678901a"));
        assert!(!is_valid_account_id("１２３４５６７８９０１２"));
    }

    #[test]
    fn test_validate() {
        assert!(account().validate().is_ok());

        let mut bad = account();
        bad.account_id = "prod".to_string();
        assert!(bad.validate().unwrap_err().contains("12-digit"));

        let mut bad = account();
        bad.email = "not-an-email".to_string();
        assert!(bad.validate().unwrap_err().contains("invalid root email"));

        let mut bad = account();
        bad.secret_id = " ".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_login_url() {
        assert_eq!(
            account().login_url(),
            "https://123456789012.signin.aws.amazon.com/console"
        );
    }
}
