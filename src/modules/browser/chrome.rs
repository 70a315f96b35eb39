use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use super::controller::{BrowserError, BrowserLauncher, BrowserSession};
use super::layout::{contains_any, PagePhase, PageState, SigninLayout};

const PAGE_POLL_INTERVAL: Duration = Duration::from_millis(250);
const OPTIONAL_ELEMENT_WAIT: Duration = Duration::from_secs(5);

/// Options for starting Chrome
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub skip_mfa: bool,
    pub screenshot_dir: Option<PathBuf>,
    /// Chrome is killed if the session sits idle longer than this
    pub idle_timeout: Duration,
}

/// Launches one Chrome process per reset session
pub struct ChromeLauncher {
    options: ChromeOptions,
    layout: SigninLayout,
}

impl ChromeLauncher {
    pub fn new(options: ChromeOptions, layout: SigninLayout) -> Self {
        Self { options, layout }
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self, root_email: &str) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let launch_options = LaunchOptions::default_builder()
            .headless(self.options.headless)
            .sandbox(false)
            .window_size(Some((1920, 1080)))
            .path(self.options.chrome_path.clone())
            .idle_browser_timeout(self.options.idle_timeout)
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let browser = Browser::new(launch_options).map_err(|e| BrowserError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        info!("Browser initialized (headless={})", self.options.headless);

        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            tab,
            layout: self.layout.clone(),
            root_email: root_email.to_string(),
            step_timeout: Duration::from_secs(crate::DEFAULT_STEP_TIMEOUT_SECS),
            step_started: Instant::now(),
            skip_mfa: self.options.skip_mfa,
            screenshot_dir: self.options.screenshot_dir.clone(),
        }))
    }
}

struct ChromeSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
    layout: SigninLayout,
    root_email: String,
    step_timeout: Duration,
    step_started: Instant,
    skip_mfa: bool,
    screenshot_dir: Option<PathBuf>,
}

impl ChromeSession {
    fn begin_step(&mut self) {
        self.step_started = Instant::now();
    }

    fn remaining(&self) -> Duration {
        self.step_timeout.saturating_sub(self.step_started.elapsed())
    }

    fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        debug!("Navigating to {}", url);
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| {
                if self.remaining().is_zero() {
                    BrowserError::Timeout(format!("loading {}", url))
                } else {
                    BrowserError::Navigation(format!("{}: {}", url, e))
                }
            })?;
        Ok(())
    }

    fn element(&self, selector: &str) -> Result<Element<'_>, BrowserError> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, self.remaining())
            .map_err(|_| BrowserError::UiElementNotFound(selector.to_string()))
    }

    fn element_by_text(&self, text: &str, wait: Duration) -> Result<Element<'_>, BrowserError> {
        self.tab
            .wait_for_xpath_with_custom_timeout(&SigninLayout::text_xpath(text), wait)
            .map_err(|_| BrowserError::UiElementNotFound(format!("'{}'", text)))
    }

    fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let element = self.element(selector)?;
        element
            .click()
            .and_then(|element| element.type_into(value))
            .map_err(|e| BrowserError::UiElementNotFound(format!("{}: {}", selector, e)))?;
        Ok(())
    }

    fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.element(selector)?
            .click()
            .map_err(|e| BrowserError::UiElementNotFound(format!("{}: {}", selector, e)))?;
        Ok(())
    }

    /// Rendered text of the page body, without markup or scripts
    fn page_text(&self) -> String {
        match self
            .tab
            .evaluate("document.body ? document.body.innerText : ''", false)
        {
            Ok(object) => object
                .value
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_default(),
            Err(e) => {
                debug!("Could not read page text: {}", e);
                String::new()
            }
        }
    }

    /// Click the optional root user affordance if the page shows one
    fn choose_root_user(&self) {
        let wait = OPTIONAL_ELEMENT_WAIT.min(self.remaining());
        match self.element_by_text(self.layout.root_user_link_text, wait) {
            Ok(link) => {
                if let Err(e) = link.click() {
                    warn!("Root user link present but not clickable: {}", e);
                }
            }
            Err(_) => debug!("No root user affordance, assuming root form is shown"),
        }
    }

    /// Enter the root email and advance to the password page
    fn submit_root_email(&self) -> Result<(), BrowserError> {
        self.choose_root_user();
        self.fill(self.layout.email_input, &self.root_email)?;
        self.click(self.layout.next_button)
    }

    /// Poll the page until one of the watched states shows up
    fn watch_page(&self, what: &str, phase: PagePhase) -> Result<PageState, BrowserError> {
        loop {
            let url = self.tab.get_url();
            if let Some(state) = self.layout.classify(phase, &url, &self.page_text()) {
                debug!("{}: {:?}", what, state);
                return Ok(state);
            }
            if self.remaining().is_zero() {
                return Err(BrowserError::Timeout(what.to_string()));
            }
            std::thread::sleep(PAGE_POLL_INTERVAL.min(self.remaining()));
        }
    }
}

impl BrowserSession for ChromeSession {
    fn set_step_timeout(&mut self, timeout: Duration) {
        self.step_timeout = timeout;
        self.tab.set_default_timeout(timeout);
    }

    fn open_login(&mut self, account_id: &str) -> Result<(), BrowserError> {
        self.begin_step();
        let url = self.layout.login_url_for(account_id);
        self.navigate(&url)?;

        let landed = self.tab.get_url();
        if !landed.contains(self.layout.signin_host) {
            return Err(BrowserError::Navigation(format!(
                "expected sign-in page, landed on {}",
                landed
            )));
        }
        Ok(())
    }

    fn trigger_forgot_password(&mut self, email: &str) -> Result<(), BrowserError> {
        self.begin_step();
        self.root_email = email.to_string();
        self.submit_root_email()?;

        let forgot = match self.element_by_text(self.layout.forgot_password_link_text, self.remaining())
        {
            Ok(link) => link,
            Err(missing) => {
                let content = self.page_text();
                if contains_any(&content, self.layout.captcha_markers).is_some() {
                    warn!("CAPTCHA detected on password page; reset must be completed manually");
                    return Err(BrowserError::SubmissionRejected(
                        "captcha challenge blocks automated reset".to_string(),
                    ));
                }
                if let Some(marker) = contains_any(&content, self.layout.recovery_rejection) {
                    return Err(BrowserError::SubmissionRejected(marker));
                }
                return Err(missing);
            }
        };
        forgot
            .click()
            .map_err(|e| BrowserError::UiElementNotFound(format!("forgot password link: {}", e)))?;
        info!("Clicked forgot password link");

        if let Some(selector) = self.layout.recovery_submit {
            let wait = OPTIONAL_ELEMENT_WAIT.min(self.remaining());
            if let Ok(button) = self.tab.wait_for_element_with_custom_timeout(selector, wait) {
                button
                    .click()
                    .map_err(|e| BrowserError::UiElementNotFound(format!("{}: {}", selector, e)))?;
            }
        }

        match self.watch_page("waiting for recovery confirmation", PagePhase::Recovery)? {
            PageState::Accepted => Ok(()),
            PageState::Rejected(marker) => Err(BrowserError::SubmissionRejected(marker)),
            PageState::Captcha => Err(BrowserError::SubmissionRejected(
                "captcha challenge blocks automated reset".to_string(),
            )),
            PageState::MfaChallenge => Err(BrowserError::SubmissionRejected(
                "unexpected MFA prompt during recovery".to_string(),
            )),
        }
    }

    fn open_reset_link(&mut self, link: &Url) -> Result<(), BrowserError> {
        self.begin_step();
        self.navigate(link.as_str())?;

        if let Some(marker) = contains_any(&self.page_text(), self.layout.expired_link_markers) {
            return Err(BrowserError::Navigation(format!("reset link unusable: {}", marker)));
        }
        self.element(self.layout.new_password_input)
            .map_err(|_| BrowserError::Navigation("reset form did not load".to_string()))?;
        Ok(())
    }

    fn submit_new_password(&mut self, credential: &SecretString) -> Result<(), BrowserError> {
        self.begin_step();
        self.fill(self.layout.new_password_input, credential.expose_secret())?;
        self.fill(self.layout.confirm_password_input, credential.expose_secret())?;
        self.click(self.layout.reset_submit)?;
        info!("Password reset form submitted");

        match self.watch_page("waiting for reset confirmation", PagePhase::Reset)? {
            PageState::Accepted => Ok(()),
            PageState::Rejected(marker) => Err(BrowserError::Validation(marker)),
            PageState::Captcha => Err(BrowserError::SubmissionRejected(
                "captcha challenge on reset form".to_string(),
            )),
            PageState::MfaChallenge => Ok(()),
        }
    }

    fn verify_login(
        &mut self,
        account_id: &str,
        credential: &SecretString,
    ) -> Result<bool, BrowserError> {
        self.begin_step();
        self.navigate(&self.layout.login_url_for(account_id))?;
        self.submit_root_email()?;
        self.fill(self.layout.password_input, credential.expose_secret())?;
        self.click(self.layout.signin_button)?;

        let state = self.watch_page("waiting for sign-in result", PagePhase::SignIn)?;
        Ok(sign_in_verified(&state, self.skip_mfa))
    }

    fn capture_diagnostics(&mut self, label: &str) {
        let dir = match &self.screenshot_dir {
            Some(dir) => dir,
            None => return,
        };
        let path = dir.join(format!(
            "aws-password-reset-{}-{}.png",
            label,
            chrono::Utc::now().timestamp()
        ));
        let result = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| e.to_string())
            .and_then(|png| std::fs::write(&path, png).map_err(|e| e.to_string()));
        match result {
            Ok(()) => info!("Screenshot saved: {}", path.display()),
            Err(e) => warn!("Screenshot failed: {}", e),
        }
    }

    fn close(&mut self) {
        if self.browser.take().is_some() {
            info!("Browser session closed");
        }
    }
}

/// Whether a sign-in page state proves the new credential works
fn sign_in_verified(state: &PageState, skip_mfa: bool) -> bool {
    match state {
        PageState::Accepted => true,
        PageState::MfaChallenge if skip_mfa => {
            info!("Password accepted, MFA challenge reached; counted as verified");
            true
        }
        PageState::MfaChallenge => {
            warn!("Sign-in stopped at MFA challenge; rerun with --skip-mfa to accept it");
            false
        }
        PageState::Rejected(marker) => {
            warn!("Sign-in rejected: {}", marker);
            false
        }
        PageState::Captcha => {
            warn!("Sign-in blocked by CAPTCHA; login could not be confirmed");
            false
        }
    }
}
