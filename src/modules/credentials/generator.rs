use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use secrecy::SecretString;

use crate::{MAX_PASSWORD_LENGTH, MIN_CHARS_PER_CLASS, MIN_PASSWORD_LENGTH};

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Credential generation and complexity errors
#[derive(Debug, PartialEq)]
pub enum CredentialError {
    InvalidLength(usize),
    TooShort,
    NoUppercase,
    NoLowercase,
    NoNumber,
    NoSpecialChar,
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::InvalidLength(length) => write!(
                f,
                "credential length {} outside {}..={}",
                length, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
            ),
            CredentialError::TooShort => write!(f, "credential is too short"),
            CredentialError::NoUppercase => write!(f, "credential lacks uppercase letters"),
            CredentialError::NoLowercase => write!(f, "credential lacks lowercase letters"),
            CredentialError::NoNumber => write!(f, "credential lacks digits"),
            CredentialError::NoSpecialChar => write!(f, "credential lacks symbols"),
        }
    }
}

impl std::error::Error for CredentialError {}

/// Generator for root user passwords with a fixed character-class policy
#[derive(Debug, Clone, Copy)]
pub struct PasswordGenerator {
    length: usize,
}

impl PasswordGenerator {
    /// Rejects lengths outside the supported range before anything is generated
    pub fn new(length: usize) -> Result<Self, CredentialError> {
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
            return Err(CredentialError::InvalidLength(length));
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Generate a fresh credential from the operating system CSPRNG
    pub fn generate(&self) -> SecretString {
        let mut rng = OsRng;
        let classes = [UPPERCASE, LOWERCASE, DIGITS, SYMBOLS];
        let mut chars: Vec<u8> = Vec::with_capacity(self.length);

        for class in classes {
            chars.extend(class.choose_multiple(&mut rng, MIN_CHARS_PER_CLASS).copied());
        }

        let alphabet: Vec<u8> = classes.concat();
        while chars.len() < self.length {
            if let Some(c) = alphabet.choose(&mut rng) {
                chars.push(*c);
            }
        }

        chars.shuffle(&mut rng);
        SecretString::from(chars.into_iter().map(char::from).collect::<String>())
    }
}

/// Check a credential against the character-class policy
pub fn validate_password(password: &str) -> Result<(), CredentialError> {
    let count = |class: &[u8]| password.bytes().filter(|b| class.contains(b)).count();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CredentialError::TooShort);
    }
    if count(UPPERCASE) < MIN_CHARS_PER_CLASS {
        return Err(CredentialError::NoUppercase);
    }
    if count(LOWERCASE) < MIN_CHARS_PER_CLASS {
        return Err(CredentialError::NoLowercase);
    }
    if count(DIGITS) < MIN_CHARS_PER_CLASS {
        return Err(CredentialError::NoNumber);
    }
    if count(SYMBOLS) < MIN_CHARS_PER_CLASS {
        return Err(CredentialError::NoSpecialChar);
    }
    Ok(())
}
