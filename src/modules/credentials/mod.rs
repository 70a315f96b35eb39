pub mod generator;

pub use generator::{validate_password, CredentialError, PasswordGenerator};
