use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

/// Provider-specific shape of a password-reset notification
pub struct ResetTemplate {
    pub provider: &'static str,
    /// Accepted `From:` addresses, compared case-insensitively
    pub senders: &'static [&'static str],
    /// Substring every reset subject contains
    pub subject_marker: &'static str,
    /// Link patterns tried in order; the first match wins
    pub link_patterns: Vec<Regex>,
}

impl ResetTemplate {
    /// Whether a bare sender address is one of this template's senders
    pub fn matches_sender(&self, address: &str) -> bool {
        let address = address.trim();
        self.senders
            .iter()
            .any(|sender| sender.eq_ignore_ascii_case(address))
    }

    pub fn matches_subject(&self, subject: &str) -> bool {
        subject
            .to_lowercase()
            .contains(&self.subject_marker.to_lowercase())
    }

    /// Pull the reset URL out of a decoded message body
    pub fn extract_reset_link(&self, body: &str) -> Option<String> {
        let body = body.replace("&amp;", "&");
        self.link_patterns
            .iter()
            .find_map(|pattern| pattern.find(&body))
            .map(|m| m.as_str().to_string())
    }

    /// IMAP SEARCH criteria narrowing the inbox to candidate messages.
    ///
    /// SINCE compares dates in the server's timezone, so the search starts a
    /// day early and callers filter on the exact timestamp.
    pub fn search_query(&self, since: DateTime<Utc>) -> String {
        let senders = self
            .senders
            .iter()
            .map(|sender| format!("FROM \"{}\"", sender))
            .collect::<Vec<_>>();

        // IMAP has no OR over n terms, so nest them pairwise
        let from_clause = senders
            .iter()
            .skip(1)
            .fold(senders.first().cloned().unwrap_or_default(), |acc, next| {
                format!("OR {} {}", next, acc)
            });

        format!(
            "{} SUBJECT \"{}\" SINCE {}",
            from_clause,
            self.subject_marker,
            (since - chrono::Duration::days(1)).format("%d-%b-%Y")
        )
    }
}

lazy_static! {
    static ref TEMPLATES: Vec<ResetTemplate> = vec![ResetTemplate {
        provider: "aws",
        senders: &["no-reply@amazon.com", "no-reply@signin.aws"],
        subject_marker: "AWS password",
        link_patterns: vec![
            Regex::new(r"https://signin\.aws\.amazon\.com/resetpassword\?token=[A-Za-z0-9\-_]+")
                .unwrap(),
            Regex::new(
                r"https://[a-z0-9\-]+\.signin\.aws\.amazon\.com/resetpassword\?token=[A-Za-z0-9\-_]+"
            )
            .unwrap(),
        ],
    }];
}

/// Look up the reset template registered for a provider
pub fn template_for(provider: &str) -> Option<&'static ResetTemplate> {
    TEMPLATES
        .iter()
        .find(|template| template.provider.eq_ignore_ascii_case(provider))
}

/// Names of every supported provider
pub fn supported_providers() -> Vec<&'static str> {
    TEMPLATES.iter().map(|template| template.provider).collect()
}
