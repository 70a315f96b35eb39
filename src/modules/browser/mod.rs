mod chrome;
pub mod controller;
pub mod layout;
#[cfg(test)]
pub(crate) mod testing;

pub use chrome::{ChromeLauncher, ChromeOptions};
pub use controller::{BrowserError, BrowserLauncher, BrowserSession, SessionGuard};
pub use layout::SigninLayout;
