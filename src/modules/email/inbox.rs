use chrono::Utc;
use log::{debug, warn};
use native_tls::{TlsConnector, TlsStream};
use secrecy::{ExposeSecret, SecretString};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::message::RawMessage;
use super::EmailError;

/// An open, authenticated mailbox
pub trait Mailbox {
    /// Run a search and return the newest `limit` matches without marking them read
    fn fetch_candidates(&mut self, query: &str, limit: usize)
        -> Result<Vec<RawMessage>, EmailError>;

    /// Close the session; errors are logged, never raised
    fn logout(&mut self);
}

/// Opens mailbox sessions; one connector is shared by every account in a run
pub trait MailboxConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Mailbox>, EmailError>;
}

/// Where the inbox lives and whom to log in as
#[derive(Debug, Clone)]
pub struct ImapEndpoint {
    pub server: String,
    pub port: u16,
    pub tls: bool,
    pub username: String,
    pub mailbox: String,
}

/// IMAP connector with bounded socket timeouts
pub struct ImapConnector {
    endpoint: ImapEndpoint,
    password: SecretString,
    io_timeout: Duration,
}

impl ImapConnector {
    pub fn new(endpoint: ImapEndpoint, password: SecretString, io_timeout: Duration) -> Self {
        Self {
            endpoint,
            password,
            io_timeout,
        }
    }

    fn open_socket(&self) -> Result<TcpStream, EmailError> {
        let address = (self.endpoint.server.as_str(), self.endpoint.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                EmailError::Connection(format!(
                    "could not resolve {}:{}",
                    self.endpoint.server, self.endpoint.port
                ))
            })?;

        let stream = TcpStream::connect_timeout(&address, self.io_timeout)?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;
        Ok(stream)
    }

    fn login<T: Read + Write>(
        &self,
        stream: T,
    ) -> Result<imap::Session<T>, EmailError> {
        let mut client = imap::Client::new(stream);
        client.read_greeting()?;

        client
            .login(&self.endpoint.username, self.password.expose_secret())
            .map_err(|(error, _client)| match error {
                imap::Error::No(msg) | imap::Error::Bad(msg) => EmailError::Auth(msg),
                other => EmailError::Connection(other.to_string()),
            })
    }
}

impl MailboxConnector for ImapConnector {
    fn connect(&self) -> Result<Box<dyn Mailbox>, EmailError> {
        let stream = self.open_socket()?;

        let session = if self.endpoint.tls {
            let connector = TlsConnector::builder()
                .build()
                .map_err(|e| EmailError::Connection(e.to_string()))?;
            let tls_stream = connector
                .connect(&self.endpoint.server, stream)
                .map_err(|e| EmailError::Connection(format!("TLS handshake failed: {}", e)))?;
            ImapSession::Tls(self.login(tls_stream)?)
        } else {
            ImapSession::Plain(self.login(stream)?)
        };

        debug!(
            "Connected to {}:{} as mailbox user",
            self.endpoint.server, self.endpoint.port
        );

        Ok(Box::new(ImapMailbox {
            session: Some(session),
            mailbox: self.endpoint.mailbox.clone(),
        }))
    }
}

enum ImapSession {
    Tls(imap::Session<TlsStream<TcpStream>>),
    Plain(imap::Session<TcpStream>),
}

struct ImapMailbox {
    session: Option<ImapSession>,
    mailbox: String,
}

impl Mailbox for ImapMailbox {
    fn fetch_candidates(
        &mut self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RawMessage>, EmailError> {
        match self.session.as_mut() {
            Some(ImapSession::Tls(session)) => fetch_from(session, &self.mailbox, query, limit),
            Some(ImapSession::Plain(session)) => fetch_from(session, &self.mailbox, query, limit),
            None => Err(EmailError::Connection("mailbox already closed".to_string())),
        }
    }

    fn logout(&mut self) {
        let result = match self.session.take() {
            Some(ImapSession::Tls(mut session)) => session.logout(),
            Some(ImapSession::Plain(mut session)) => session.logout(),
            None => return,
        };
        if let Err(e) = result {
            warn!("Mailbox logout failed: {}", e);
        }
    }
}

fn fetch_from<T: Read + Write>(
    session: &mut imap::Session<T>,
    mailbox: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<RawMessage>, EmailError> {
    // Re-selecting refreshes the view so newly delivered mail is searchable
    session.select(mailbox)?;

    let mut ids: Vec<u32> = session.search(query)?.into_iter().collect();
    ids.sort_unstable();

    let newest: Vec<String> = ids
        .iter()
        .rev()
        .take(limit)
        .map(|id| id.to_string())
        .collect();
    if newest.is_empty() {
        return Ok(Vec::new());
    }

    let fetches = session.fetch(newest.join(","), "(BODY.PEEK[] INTERNALDATE)")?;
    Ok(fetches
        .iter()
        .filter_map(|fetch| {
            let body = fetch.body()?;
            Some(RawMessage {
                internal_date: fetch.internal_date().map(|date| date.with_timezone(&Utc)),
                rfc822: body.to_vec(),
            })
        })
        .collect())
}
