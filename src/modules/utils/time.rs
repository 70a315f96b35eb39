use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of wall-clock time and blocking waits.
///
/// Every suspension point in a reset session (mailbox polling, deadline
/// checks) goes through a clock so tests can drive time by hand.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Clock backed by the system time and `std::thread::sleep`
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed time budget measured from a start instant
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started_at: DateTime<Utc>,
    budget: Duration,
}

impl Deadline {
    pub fn start(started_at: DateTime<Utc>, budget: Duration) -> Self {
        Self { started_at, budget }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time spent since the start, zero if the clock went backwards
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        elapsed_between(self.started_at, now)
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.budget.saturating_sub(self.elapsed(now))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.elapsed(now) >= self.budget
    }
}

/// Non-negative duration between two instants
pub fn elapsed_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or_default()
}

/// Function to format a timestamp as a readable UTC date
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format a duration to a short human readable string
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds < 60 {
        format!("{} seconds", seconds)
    } else if seconds < 3600 {
        format!("{} minutes", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours", seconds / 3600)
    } else {
        format!("{} days", seconds / 86400)
    }
}

/// Manually driven clock for tests; `sleep` advances time instantly
#[cfg(test)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
