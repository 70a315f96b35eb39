// Declare all modules
pub mod browser;
pub mod config;
pub mod credentials;
pub mod email;
pub mod reset;
pub mod runner;
pub mod store;
pub mod utils;

// No re-exports here as they're handled in lib.rs
