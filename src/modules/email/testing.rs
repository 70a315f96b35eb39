use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::inbox::{Mailbox, MailboxConnector};
use super::message::RawMessage;
use super::EmailError;
use crate::modules::utils::time::{Clock, ManualClock};

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    logouts: AtomicUsize,
    polls: AtomicUsize,
}

/// Inbox whose messages become visible once the manual clock reaches them
pub struct ScriptedInbox {
    clock: Arc<ManualClock>,
    deliveries: Arc<Mutex<Vec<(DateTime<Utc>, RawMessage)>>>,
    counters: Arc<Counters>,
    reject_login: bool,
    failing_connects: AtomicUsize,
}

impl ScriptedInbox {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            deliveries: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Counters::default()),
            reject_login: false,
            failing_connects: AtomicUsize::new(0),
        }
    }

    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    pub fn failing_connects(self, count: usize) -> Self {
        self.failing_connects.store(count, Ordering::SeqCst);
        self
    }

    pub fn deliver(&self, at: DateTime<Utc>, message: RawMessage) {
        self.deliveries.lock().unwrap().push((at, message));
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.counters.logouts.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.counters.polls.load(Ordering::SeqCst)
    }
}

impl MailboxConnector for ScriptedInbox {
    fn connect(&self) -> Result<Box<dyn Mailbox>, EmailError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.reject_login {
            return Err(EmailError::Auth("[AUTHENTICATIONFAILED] Invalid credentials".to_string()));
        }
        let pending = self.failing_connects.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_connects.store(pending - 1, Ordering::SeqCst);
            return Err(EmailError::Connection("connection reset by peer".to_string()));
        }
        Ok(Box::new(ScriptedMailbox {
            clock: self.clock.clone(),
            deliveries: self.deliveries.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct ScriptedMailbox {
    clock: Arc<ManualClock>,
    deliveries: Arc<Mutex<Vec<(DateTime<Utc>, RawMessage)>>>,
    counters: Arc<Counters>,
}

impl Mailbox for ScriptedMailbox {
    fn fetch_candidates(
        &mut self,
        _query: &str,
        limit: usize,
    ) -> Result<Vec<RawMessage>, EmailError> {
        self.counters.polls.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        let visible: Vec<RawMessage> = self
            .deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(at, _)| *at <= now)
            .map(|(_, message)| message.clone())
            .collect();
        let skip = visible.len().saturating_sub(limit);
        Ok(visible.into_iter().skip(skip).collect())
    }

    fn logout(&mut self) {
        self.counters.logouts.fetch_add(1, Ordering::SeqCst);
    }
}
