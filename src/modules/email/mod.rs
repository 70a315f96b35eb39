pub mod credentials;
mod error;
pub mod inbox;
pub mod message;
pub mod retriever;
pub mod setup;
pub mod templates;
#[cfg(test)]
pub(crate) mod testing;

pub use credentials::ImapCredentialStore;
pub use error::EmailError;
pub use inbox::{ImapConnector, ImapEndpoint, Mailbox, MailboxConnector};
pub use retriever::{EmailRetriever, ResetLink};
pub use templates::{supported_providers, template_for};
