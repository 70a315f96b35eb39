use itertools::Itertools;
use serde::Serialize;

use crate::modules::reset::{OutcomeReport, OutcomeStatus};

/// Aggregate result of one run over the configured accounts
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Finished accounts, in configuration order
    pub results: Vec<OutcomeReport>,
    /// Accounts never started because of fail-fast, an interrupt or an abort
    pub not_started: Vec<String>,
    /// Infrastructure error that stopped the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// 0 when every account succeeded or was skipped, 1 when any account
    /// failed or never ran, 2 when the run itself was aborted
    pub fn exit_code(&self) -> i32 {
        if self.aborted.is_some() {
            2
        } else if self.count(OutcomeStatus::Failed) > 0 || !self.not_started.is_empty() {
            1
        } else {
            0
        }
    }

    /// One JSON object per finished account
    pub fn json_lines(&self) -> Result<Vec<String>, serde_json::Error> {
        self.results.iter().map(serde_json::to_string).collect()
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} succeeded, {} skipped, {} failed",
            self.count(OutcomeStatus::Succeeded),
            self.count(OutcomeStatus::Skipped),
            self.count(OutcomeStatus::Failed)
        );
        if !self.not_started.is_empty() {
            summary.push_str(&format!(
                ", not started: {}",
                self.not_started.iter().join(", ")
            ));
        }
        if let Some(reason) = &self.aborted {
            summary.push_str(&format!(" (aborted: {})", reason));
        }
        summary
    }

    pub fn to_text(&self) -> String {
        let lines = self
            .results
            .iter()
            .map(|r| {
                let kind = r
                    .kind
                    .map(|k| format!(" [{}]", k))
                    .unwrap_or_default();
                format!(
                    "{:<20} {} {:<10}{} {} ({:.1}s)",
                    r.account,
                    r.account_id,
                    r.status.as_str(),
                    kind,
                    r.reason,
                    r.elapsed_seconds
                )
            })
            .join("\n");
        if lines.is_empty() {
            self.summary()
        } else {
            format!("{}\n{}", lines, self.summary())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::reset::ErrorKind;

    fn entry(account: &str, status: OutcomeStatus) -> OutcomeReport {
        OutcomeReport {
            account: account.to_string(),
            account_id: "123456789012".to_string(),
            status,
            kind: match status {
                OutcomeStatus::Failed => Some(ErrorKind::Timeout),
                _ => None,
            },
            reason: "reason".to_string(),
            last_stage: None,
            elapsed_seconds: 1.5,
            finished_at: "2026-10-16 12:00:00".to_string(),
        }
    }

    #[test]
    fn test_exit_codes() {
        let mut report = RunReport {
            results: vec![
                entry("prod", OutcomeStatus::Succeeded),
                entry("dev", OutcomeStatus::Skipped),
            ],
            ..RunReport::default()
        };
        assert_eq!(report.exit_code(), 0);

        report.not_started.push("staging".to_string());
        assert_eq!(report.exit_code(), 1);

        report.not_started.clear();
        report.results.push(entry("staging", OutcomeStatus::Failed));
        assert_eq!(report.exit_code(), 1);

        report.aborted = Some("Secret store unavailable".to_string());
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn test_text_output() {
        let report = RunReport {
            results: vec![
                entry("prod", OutcomeStatus::Succeeded),
                entry("staging", OutcomeStatus::Failed),
            ],
            not_started: vec!["dev".to_string()],
            aborted: None,
        };
        let text = report.to_text();
        assert!(text.contains("[timeout]"));
        assert!(text.ends_with("1 succeeded, 0 skipped, 1 failed, not started: dev"));
        assert_eq!(report.json_lines().unwrap().len(), 2);
    }
}
