use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use mailparse::{MailAddr, MailHeaderMap, ParsedMail};

use super::EmailError;

/// Message as fetched from the server, before MIME parsing
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Server receipt time (IMAP INTERNALDATE) when the server reports one
    pub internal_date: Option<DateTime<Utc>>,
    pub rfc822: Vec<u8>,
}

/// Decoded view of a candidate reset email
#[derive(Debug, Clone)]
pub struct MailMessage {
    /// Bare `From:` mailbox addresses, lowercased
    pub from: Vec<String>,
    /// Bare recipient mailbox addresses, lowercased
    pub recipients: Vec<String>,
    pub subject: String,
    pub received_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Every text/plain and text/html part, joined
    pub body: String,
}

impl MailMessage {
    /// Ordering timestamp: server receipt time, then the `Date:` header
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.received_at.or(self.sent_at)
    }

    /// Exact mailbox comparison; `nonprod-root@` never matches `root@`
    pub fn is_addressed_to(&self, recipient: &str) -> bool {
        let recipient = recipient.trim();
        self.recipients
            .iter()
            .any(|address| address.eq_ignore_ascii_case(recipient))
    }
}

/// Parse a fetched message into the fields reset matching needs
pub fn parse_message(raw: &RawMessage) -> Result<MailMessage, EmailError> {
    let parsed = mailparse::parse_mail(&raw.rfc822)
        .map_err(|e| EmailError::Parse(format!("unreadable message: {}", e)))?;

    let header = |name: &str| parsed.headers.get_first_value(name).unwrap_or_default();

    let from = addresses(&parsed, &["From"]);
    let recipients = addresses(&parsed, &["To", "Cc", "Delivered-To", "X-Original-To"]);

    let sent_at = parsed
        .headers
        .get_first_value("Date")
        .and_then(|date| mailparse::dateparse(&date).ok())
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single());

    let mut parts = Vec::new();
    collect_text_parts(&parsed, &mut parts);

    Ok(MailMessage {
        from,
        recipients,
        subject: header("Subject"),
        received_at: raw.internal_date,
        sent_at,
        body: parts.join("\n"),
    })
}

/// Mailbox addresses from every named header, groups flattened
fn addresses(parsed: &ParsedMail, names: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for header in names.iter().flat_map(|name| parsed.headers.get_all_headers(name)) {
        let list = match mailparse::addrparse_header(header) {
            Ok(list) => list,
            Err(e) => {
                debug!("Ignoring unparsable {} header: {}", header.get_key(), e);
                continue;
            }
        };
        for addr in list.iter() {
            match addr {
                MailAddr::Single(info) => out.push(info.addr.trim().to_lowercase()),
                MailAddr::Group(group) => out.extend(
                    group.addrs.iter().map(|info| info.addr.trim().to_lowercase()),
                ),
            }
        }
    }
    out
}

fn collect_text_parts(part: &ParsedMail, out: &mut Vec<String>) {
    if part.subparts.is_empty() {
        let mimetype = part.ctype.mimetype.to_lowercase();
        if mimetype == "text/plain" || mimetype == "text/html" {
            // Undecodable parts are skipped, the remaining ones may still carry the link
            if let Ok(body) = part.get_body() {
                out.push(body);
            }
        }
        return;
    }
    for sub in &part.subparts {
        collect_text_parts(sub, out);
    }
}

/// Build an RFC 5322 reset notification for tests
#[cfg(test)]
pub(crate) fn reset_email(
    to: &str,
    subject: &str,
    body: &str,
    sent_at: DateTime<Utc>,
) -> RawMessage {
    use lettre::message::header::ContentType;
    use lettre::Message;

    let message = Message::builder()
        .from("Amazon Web Services <no-reply@amazon.com>".parse().unwrap())
        .to(to.parse().unwrap())
        .subject(subject)
        .date(sent_at.into())
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .unwrap();

    RawMessage {
        internal_date: Some(sent_at),
        rfc822: message.formatted(),
    }
}
