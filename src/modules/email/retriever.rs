use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::time::Duration;
use url::Url;

use super::inbox::{Mailbox, MailboxConnector};
use super::message::{parse_message, MailMessage, RawMessage};
use super::templates::{template_for, ResetTemplate};
use super::EmailError;
use crate::modules::utils::logging::format_sensitive;
use crate::modules::utils::time::{Clock, Deadline};

/// A reset link pulled from a qualifying email
#[derive(Debug, Clone)]
pub struct ResetLink {
    pub url: Url,
    pub received_at: DateTime<Utc>,
}

/// Polls an inbox for the reset email triggered by one session
pub struct EmailRetriever {
    template: &'static ResetTemplate,
    poll_interval: Duration,
    max_messages: usize,
}

/// Logs the mailbox out however the poll loop ends
struct MailboxGuard(Box<dyn Mailbox>);

impl Drop for MailboxGuard {
    fn drop(&mut self) {
        self.0.logout();
    }
}

impl EmailRetriever {
    pub fn new(
        provider: &str,
        poll_interval: Duration,
        max_messages: usize,
    ) -> Result<Self, EmailError> {
        let template = template_for(provider)
            .ok_or_else(|| EmailError::Config(format!("unsupported provider '{}'", provider)))?;
        Ok(Self {
            template,
            poll_interval,
            max_messages: max_messages.max(1),
        })
    }

    /// Wait for the reset email addressed to `recipient` sent at or after `since`.
    ///
    /// Authentication and parse failures end the wait at once. Connection
    /// trouble is logged and retried on the next poll until `timeout` runs out.
    pub fn fetch_reset_link(
        &self,
        connector: &dyn MailboxConnector,
        clock: &dyn Clock,
        recipient: &str,
        since: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<ResetLink, EmailError> {
        let deadline = Deadline::start(clock.now(), timeout);
        let query = self.template.search_query(since);
        let mut mailbox: Option<MailboxGuard> = None;
        let mut polls = 0u32;

        info!(
            "Waiting up to {}s for {} reset email to {}",
            timeout.as_secs(),
            self.template.provider,
            format_sensitive(recipient)
        );

        loop {
            if mailbox.is_none() {
                match connector.connect() {
                    Ok(session) => mailbox = Some(MailboxGuard(session)),
                    Err(EmailError::Connection(msg)) => warn!("Mailbox connect failed: {}", msg),
                    Err(e) => return Err(e),
                }
            }

            let fetched = match mailbox.as_mut() {
                Some(guard) => Some(guard.0.fetch_candidates(&query, self.max_messages)),
                None => None,
            };
            polls += 1;

            match fetched {
                Some(Ok(raw)) => {
                    if let Some(link) = self.select_link(&raw, recipient, since)? {
                        info!("Found reset email after {} poll(s)", polls);
                        return Ok(link);
                    }
                    debug!("Poll {}: no qualifying message among {}", polls, raw.len());
                }
                Some(Err(EmailError::Connection(msg))) => {
                    warn!("Mailbox poll failed, reconnecting: {}", msg);
                    mailbox = None;
                }
                Some(Err(e)) => return Err(e),
                None => {}
            }

            let now = clock.now();
            if deadline.is_expired(now) {
                return Err(EmailError::Timeout(timeout));
            }
            clock.sleep(self.poll_interval.min(deadline.remaining(now)));
        }
    }

    /// Pick the newest qualifying message and extract its link
    fn select_link(
        &self,
        raw: &[RawMessage],
        recipient: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<ResetLink>, EmailError> {
        let newest = raw
            .iter()
            .filter_map(|message| match parse_message(message) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Skipping unreadable message: {}", e);
                    None
                }
            })
            .filter(|message| self.qualifies(message, recipient, since))
            .max_by_key(|message| message.timestamp());

        let message = match newest {
            Some(message) => message,
            None => return Ok(None),
        };

        let link = self.template.extract_reset_link(&message.body).ok_or_else(|| {
            EmailError::Parse(format!(
                "message '{}' matched but contains no known reset link",
                message.subject
            ))
        })?;
        let url = Url::parse(&link)
            .map_err(|e| EmailError::Parse(format!("invalid reset link: {}", e)))?;

        Ok(Some(ResetLink {
            url,
            received_at: message.timestamp().unwrap_or(since),
        }))
    }

    fn qualifies(&self, message: &MailMessage, recipient: &str, since: DateTime<Utc>) -> bool {
        // Undated messages cannot be proven fresh
        let fresh = message.timestamp().map_or(false, |at| at >= since);
        fresh
            && message.from.iter().any(|address| self.template.matches_sender(address))
            && self.template.matches_subject(&message.subject)
            && message.is_addressed_to(recipient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::email::message::reset_email;
    use crate::modules::email::testing::ScriptedInbox;
    use crate::modules::utils::time::ManualClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    const LINK: &str = "https://signin.aws.amazon.com/resetpassword?token=fresh-123";
    const STALE_LINK: &str = "https://signin.aws.amazon.com/resetpassword?token=stale-999";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
    }

    fn retriever() -> EmailRetriever {
        EmailRetriever::new("aws", Duration::from_secs(5), 10).unwrap()
    }

    fn body(link: &str) -> String {
        format!("To reset your AWS password, open {} within 30 minutes.", link)
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        assert!(matches!(
            EmailRetriever::new("hotmail", Duration::from_secs(5), 10),
            Err(EmailError::Config(_))
        ));
    }

    #[test]
    fn test_finds_link_that_arrives_later() {
        let clock = Arc::new(ManualClock::new(start()));
        let inbox = ScriptedInbox::new(clock.clone());
        inbox.deliver(
            start() + chrono::Duration::seconds(12),
            reset_email(
                "root@example.com",
                "AWS Password Assistance",
                &body(LINK),
                start() + chrono::Duration::seconds(12),
            ),
        );

        let link = retriever()
            .fetch_reset_link(
                &inbox,
                clock.as_ref(),
                "root@example.com",
                start(),
                Duration::from_secs(120),
            )
            .unwrap();

        assert_eq!(link.url.as_str(), LINK);
        assert_eq!(clock.now(), start() + chrono::Duration::seconds(15));
        assert_eq!(inbox.connects(), 1);
        assert_eq!(inbox.logouts(), 1);
    }

    #[test]
    fn test_ignores_messages_older_than_trigger() {
        let clock = Arc::new(ManualClock::new(start()));
        let inbox = ScriptedInbox::new(clock.clone());
        let stale_at = start() - chrono::Duration::seconds(60);
        inbox.deliver(
            stale_at,
            reset_email("root@example.com", "AWS Password Assistance", &body(STALE_LINK), stale_at),
        );

        let result = retriever().fetch_reset_link(
            &inbox,
            clock.as_ref(),
            "root@example.com",
            start(),
            Duration::from_secs(30),
        );

        assert!(matches!(result, Err(EmailError::Timeout(_))));
        assert_eq!(inbox.logouts(), 1);
    }

    #[test]
    fn test_ignores_reset_mail_for_similar_address() {
        let clock = Arc::new(ManualClock::new(start()));
        let inbox = ScriptedInbox::new(clock.clone());
        let at = start() + chrono::Duration::seconds(2);
        inbox.deliver(
            at,
            reset_email("nonprod-root@example.com", "AWS Password Assistance", &body(STALE_LINK), at),
        );

        let result = retriever().fetch_reset_link(
            &inbox,
            clock.as_ref(),
            "root@example.com",
            start(),
            Duration::from_secs(30),
        );

        assert!(matches!(result, Err(EmailError::Timeout(_))));
    }

    #[test]
    fn test_newest_fresh_message_wins_over_stale_one() {
        let clock = Arc::new(ManualClock::new(start()));
        let inbox = ScriptedInbox::new(clock.clone());
        let stale_at = start() - chrono::Duration::seconds(1);
        let fresh_at = start() + chrono::Duration::seconds(3);
        inbox.deliver(
            stale_at,
            reset_email("root@example.com", "AWS Password Assistance", &body(STALE_LINK), stale_at),
        );
        inbox.deliver(
            fresh_at,
            reset_email("root@example.com", "AWS Password Assistance", &body(LINK), fresh_at),
        );

        let link = retriever()
            .fetch_reset_link(
                &inbox,
                clock.as_ref(),
                "root@example.com",
                start(),
                Duration::from_secs(60),
            )
            .unwrap();
        assert_eq!(link.url.as_str(), LINK);
        assert_eq!(link.received_at, fresh_at);
    }

    #[test]
    fn test_other_recipient_is_not_selected() {
        let clock = Arc::new(ManualClock::new(start()));
        let inbox = ScriptedInbox::new(clock.clone());
        inbox.deliver(
            start(),
            reset_email("other@example.com", "AWS Password Assistance", &body(LINK), start()),
        );

        let result = retriever().fetch_reset_link(
            &inbox,
            clock.as_ref(),
            "root@example.com",
            start(),
            Duration::from_secs(10),
        );
        assert!(matches!(result, Err(EmailError::Timeout(_))));
    }

    #[test]
    fn test_matching_message_without_link_is_parse_error() {
        let clock = Arc::new(ManualClock::new(start()));
        let inbox = ScriptedInbox::new(clock.clone());
        inbox.deliver(
            start(),
            reset_email(
                "root@example.com",
                "AWS Password Assistance",
                "Click the button in the app to continue.",
                start(),
            ),
        );

        let result = retriever().fetch_reset_link(
            &inbox,
            clock.as_ref(),
            "root@example.com",
            start(),
            Duration::from_secs(60),
        );
        assert!(matches!(result, Err(EmailError::Parse(_))));
        assert_eq!(clock.now(), start());
    }

    #[test]
    fn test_auth_failure_is_not_retried() {
        let clock = Arc::new(ManualClock::new(start()));
        let inbox = ScriptedInbox::new(clock.clone()).rejecting_login();

        let result = retriever().fetch_reset_link(
            &inbox,
            clock.as_ref(),
            "root@example.com",
            start(),
            Duration::from_secs(60),
        );
        assert!(matches!(result, Err(EmailError::Auth(_))));
        assert_eq!(inbox.connects(), 1);
        assert_eq!(clock.now(), start());
    }

    #[test]
    fn test_connection_errors_are_retried_until_budget() {
        let clock = Arc::new(ManualClock::new(start()));
        let inbox = ScriptedInbox::new(clock.clone()).failing_connects(2);
        inbox.deliver(
            start() + chrono::Duration::seconds(1),
            reset_email(
                "root@example.com",
                "AWS Password Assistance",
                &body(LINK),
                start() + chrono::Duration::seconds(1),
            ),
        );

        let link = retriever()
            .fetch_reset_link(
                &inbox,
                clock.as_ref(),
                "root@example.com",
                start(),
                Duration::from_secs(60),
            )
            .unwrap();
        assert_eq!(link.url.as_str(), LINK);
        assert_eq!(inbox.connects(), 3);
        assert_eq!(inbox.logouts(), 1);
    }
}
