use url::Url;

/// Selectors and page markers for one sign-in provider.
///
/// Markers are matched case-insensitively against the visible page text.
#[derive(Debug, Clone)]
pub struct SigninLayout {
    pub name: &'static str,
    /// `{account}` is replaced with the account id
    pub login_url: &'static str,
    /// Host fragment every sign-in page lives under
    pub signin_host: &'static str,
    /// Link text of the optional "root user" affordance
    pub root_user_link_text: &'static str,
    pub email_input: &'static str,
    pub next_button: &'static str,
    pub forgot_password_link_text: &'static str,
    /// Dialog button that sends the recovery email, when the provider shows one
    pub recovery_submit: Option<&'static str>,
    pub recovery_confirmation: &'static [&'static str],
    pub recovery_rejection: &'static [&'static str],
    pub captcha_markers: &'static [&'static str],
    pub expired_link_markers: &'static [&'static str],
    pub new_password_input: &'static str,
    pub confirm_password_input: &'static str,
    pub reset_submit: &'static str,
    pub reset_success: &'static [&'static str],
    pub reset_rejection: &'static [&'static str],
    pub password_input: &'static str,
    pub signin_button: &'static str,
    /// Hosts (and their subdomains) only reached after a successful sign-in
    pub console_hosts: &'static [&'static str],
    pub mfa_markers: &'static [&'static str],
    pub login_rejection: &'static [&'static str],
}

impl SigninLayout {
    /// AWS console root user sign-in
    pub fn aws_root() -> Self {
        Self {
            name: "aws",
            login_url: "https://{account}.signin.aws.amazon.com/console",
            signin_host: "signin.aws.amazon.com",
            root_user_link_text: "Sign in using root user email",
            email_input: "#resolving_input",
            next_button: "#next_button",
            forgot_password_link_text: "Forgot your password",
            recovery_submit: Some("#password_recovery_ok_button"),
            recovery_confirmation: &[
                "password recovery email has been sent",
                "check your email",
                "we sent you an email",
            ],
            recovery_rejection: &[
                "no account found",
                "does not match",
                "could not find",
                "is not valid",
            ],
            captcha_markers: &["captcha", "security check", "type the characters"],
            expired_link_markers: &["link has expired", "link is invalid", "token is invalid"],
            new_password_input: "#newPassword",
            confirm_password_input: "#confirmPassword",
            reset_submit: "#submitButton",
            reset_success: &[
                "password has been changed",
                "password has been reset",
                "password reset successful",
            ],
            reset_rejection: &[
                "does not meet",
                "cannot reuse",
                "previously used",
                "passwords do not match",
            ],
            password_input: "#password",
            signin_button: "#signin_button",
            console_hosts: &["console.aws.amazon.com"],
            mfa_markers: &["mfacode", "multi-factor authentication", "mfa code"],
            login_rejection: &["authentication information is incorrect", "incorrect password"],
        }
    }

    pub fn login_url_for(&self, account_id: &str) -> String {
        self.login_url.replace("{account}", account_id)
    }

    /// Decide what the page shows after a submission, if anything yet.
    ///
    /// Rejection and CAPTCHA win over acceptance, so stray confirmation
    /// words never hide an error banner.
    pub fn classify(&self, phase: PagePhase, url: &str, text: &str) -> Option<PageState> {
        let rejection = match phase {
            PagePhase::Recovery => self.recovery_rejection,
            PagePhase::Reset => self.reset_rejection,
            PagePhase::SignIn => self.login_rejection,
        };
        if let Some(marker) = contains_any(text, rejection) {
            return Some(PageState::Rejected(marker));
        }
        if contains_any(text, self.captcha_markers).is_some() {
            return Some(PageState::Captcha);
        }

        let accepted = match phase {
            PagePhase::Recovery => contains_any(text, self.recovery_confirmation).is_some(),
            PagePhase::Reset => contains_any(text, self.reset_success).is_some(),
            PagePhase::SignIn => {
                if contains_any(text, self.mfa_markers).is_some() {
                    return Some(PageState::MfaChallenge);
                }
                self.is_console_url(url)
            }
        };
        if accepted {
            Some(PageState::Accepted)
        } else {
            None
        }
    }

    /// Whether `url` is served from a console host. Query strings such as
    /// `redirect_uri` on the sign-in page do not count.
    pub fn is_console_url(&self, url: &str) -> bool {
        let host = match Url::parse(url) {
            Ok(url) => match url.host_str() {
                Some(host) => host.to_ascii_lowercase(),
                None => return false,
            },
            Err(_) => return false,
        };
        self.console_hosts
            .iter()
            .any(|console| host == *console || host.ends_with(&format!(".{}", console)))
    }

    /// XPath for a link or button whose visible text contains `text`
    pub fn text_xpath(text: &str) -> String {
        format!(
            "//*[self::a or self::button or self::span][contains(normalize-space(.), '{}')]",
            text
        )
    }
}

/// Which submission a page is answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePhase {
    Recovery,
    Reset,
    SignIn,
}

/// What the page shows after a form submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Accepted,
    Rejected(String),
    Captcha,
    MfaChallenge,
}

/// Whether any marker occurs in `haystack`, ignoring case
pub fn contains_any(haystack: &str, markers: &[&str]) -> Option<String> {
    let haystack = haystack.to_lowercase();
    markers
        .iter()
        .find(|marker| haystack.contains(&marker.to_lowercase()))
        .map(|marker| marker.to_string())
}
