use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use super::controller::{BrowserError, BrowserLauncher, BrowserSession};
use crate::modules::utils::time::ManualClock;

#[derive(Default)]
struct Script {
    launch_error: Option<BrowserError>,
    open_login_error: Option<BrowserError>,
    trigger_error: Option<BrowserError>,
    open_link_error: Option<BrowserError>,
    submit_results: VecDeque<Result<(), BrowserError>>,
    verify_result: Option<Result<bool, BrowserError>>,
    clock: Option<(Arc<ManualClock>, Duration)>,
    launches: usize,
    closes: usize,
    calls: Vec<String>,
    submitted: Vec<String>,
    step_timeouts: Vec<Duration>,
}

/// Browser double that replays scripted results and records every call
#[derive(Clone, Default)]
pub struct ScriptedBrowser {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation advances the manual clock by `step_cost`
    pub fn with_clock(self, clock: Arc<ManualClock>, step_cost: Duration) -> Self {
        self.script.lock().unwrap().clock = Some((clock, step_cost));
        self
    }

    pub fn failing_launch(self, error: BrowserError) -> Self {
        self.script.lock().unwrap().launch_error = Some(error);
        self
    }

    pub fn failing_open_login(self, error: BrowserError) -> Self {
        self.script.lock().unwrap().open_login_error = Some(error);
        self
    }

    pub fn failing_trigger(self, error: BrowserError) -> Self {
        self.script.lock().unwrap().trigger_error = Some(error);
        self
    }

    pub fn failing_open_link(self, error: BrowserError) -> Self {
        self.script.lock().unwrap().open_link_error = Some(error);
        self
    }

    /// The next `count` submissions are rejected, later ones accepted
    pub fn rejecting_submissions(self, count: usize) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            for _ in 0..count {
                script.submit_results.push_back(Err(BrowserError::Validation(
                    "Password does not meet the requirements".to_string(),
                )));
            }
        }
        self
    }

    pub fn verifying(self, result: Result<bool, BrowserError>) -> Self {
        self.script.lock().unwrap().verify_result = Some(result);
        self
    }

    pub fn launches(&self) -> usize {
        self.script.lock().unwrap().launches
    }

    pub fn closes(&self) -> usize {
        self.script.lock().unwrap().closes
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.script.lock().unwrap().submitted.clone()
    }

    pub fn step_timeouts(&self) -> Vec<Duration> {
        self.script.lock().unwrap().step_timeouts.clone()
    }
}

impl BrowserLauncher for ScriptedBrowser {
    fn launch(&self, _root_email: &str) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let mut script = self.script.lock().unwrap();
        script.launches += 1;
        if let Some(error) = script.launch_error.clone() {
            return Err(error);
        }
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
        }))
    }
}

struct ScriptedSession {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSession {
    fn record(&self, call: &str) {
        let mut script = self.script.lock().unwrap();
        script.calls.push(call.to_string());
        if let Some((clock, cost)) = &script.clock {
            clock.advance(*cost);
        }
    }
}

impl BrowserSession for ScriptedSession {
    fn set_step_timeout(&mut self, timeout: Duration) {
        self.script.lock().unwrap().step_timeouts.push(timeout);
    }

    fn open_login(&mut self, _account_id: &str) -> Result<(), BrowserError> {
        self.record("open_login");
        match self.script.lock().unwrap().open_login_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn trigger_forgot_password(&mut self, _email: &str) -> Result<(), BrowserError> {
        self.record("trigger_forgot_password");
        match self.script.lock().unwrap().trigger_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn open_reset_link(&mut self, _link: &Url) -> Result<(), BrowserError> {
        self.record("open_reset_link");
        match self.script.lock().unwrap().open_link_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn submit_new_password(&mut self, credential: &SecretString) -> Result<(), BrowserError> {
        self.record("submit_new_password");
        let mut script = self.script.lock().unwrap();
        script.submitted.push(credential.expose_secret().to_string());
        script.submit_results.pop_front().unwrap_or(Ok(()))
    }

    fn verify_login(
        &mut self,
        _account_id: &str,
        _credential: &SecretString,
    ) -> Result<bool, BrowserError> {
        self.record("verify_login");
        self.script
            .lock()
            .unwrap()
            .verify_result
            .clone()
            .unwrap_or(Ok(true))
    }

    fn close(&mut self) {
        self.script.lock().unwrap().closes += 1;
    }
}
