//! Screen-driven login automation
//!
//! The automator takes a snapshot of the page, works out which [`Screen`]
//! it is on, acts on it, and repeats until the device request is approved.

mod screen;

pub use screen::{ElementState, PageSnapshot, Screen, allow_selectors, watched_selectors};

use anyhow::Result;
use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::{
    constants::{
        COOKIE_BANNER_SELECTOR, CONFIRM_ID, DEFAULT_LOGIN_TIMEOUT_SECS,
        DONT_SHOW_AGAIN_CHECKBOX_ID, EMAIL_ID, MAX_SCREEN_ATTEMPTS, MFA_CHECKBOX_ID,
        MFA_CODE_INPUT_ID, MFA_DESCRIPTION_ID, MFA_PROMPT_TIMEOUT, MFA_VERIFY_ID, POLL_INTERVAL,
        PWD_ID, SCREEN_TRANSITION_TIMEOUT, SUBMIT_BUTTON_ID, YES_BUTTON_ID, id_selector,
    },
    error::AutomationError,
    prompt::Prompter,
    secrets::LoginSecrets,
};

/// The browser tab the automator drives
#[async_trait]
pub trait LoginPage: Send + Sync {
    async fn snapshot(&self) -> Result<PageSnapshot>;
    async fn click(&self, selector: &str) -> Result<()>;
    /// Replace the value of an input
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;
    async fn text(&self, selector: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct AutomatorOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub transition_timeout: Duration,
    pub mfa_timeout: Duration,
    pub max_screen_attempts: u32,
    pub remember_mfa_device: bool,
}

impl Default for AutomatorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS),
            poll_interval: POLL_INTERVAL,
            transition_timeout: SCREEN_TRANSITION_TIMEOUT,
            mfa_timeout: MFA_PROMPT_TIMEOUT,
            max_screen_attempts: MAX_SCREEN_ATTEMPTS,
            remember_mfa_device: false,
        }
    }
}

pub struct Automator<'a, P: LoginPage> {
    page: &'a P,
    prompter: &'a dyn Prompter,
    secrets: &'a LoginSecrets,
    options: AutomatorOptions,
}

impl<'a, P: LoginPage> Automator<'a, P> {
    pub fn new(
        page: &'a P,
        prompter: &'a dyn Prompter,
        secrets: &'a LoginSecrets,
        options: AutomatorOptions,
    ) -> Self {
        Self {
            page,
            prompter,
            secrets,
            options,
        }
    }

    /// Drive the page until the request is approved
    pub async fn run(&self) -> Result<()> {
        let deadline = Instant::now() + self.options.timeout;
        let mut attempts: HashMap<Screen, u32> = HashMap::new();
        let mut last = Screen::Pending;

        loop {
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout {
                    screen: last,
                    waited: self.options.timeout,
                }
                .into());
            }

            let snapshot = self.page.snapshot().await?;
            self.dismiss_cookie_banner(&snapshot).await;

            let screen = Screen::detect(&snapshot);
            if screen != last {
                info!("Login screen: {}", screen);
                last = screen;
            }

            match screen {
                Screen::Approved => {
                    info!("SSO login automated successfully");
                    return Ok(());
                }
                Screen::Pending => time::sleep(self.options.poll_interval).await,
                _ => {
                    let count = attempts.entry(screen).or_insert(0);
                    *count += 1;
                    if *count > self.options.max_screen_attempts {
                        return Err(AutomationError::Stuck {
                            screen,
                            attempts: *count - 1,
                        }
                        .into());
                    }

                    self.handle(screen, &snapshot, deadline).await?;
                    self.wait_for_transition(screen, deadline).await?;
                }
            }
        }
    }

    async fn handle(&self, screen: Screen, snapshot: &PageSnapshot, deadline: Instant) -> Result<()> {
        match screen {
            Screen::ConfirmCode => {
                self.click(&id_selector(CONFIRM_ID), "Confirm and continue")
                    .await
            }
            Screen::Email => {
                info!("Email input found. Entering credentials.");
                self.fill(&id_selector(EMAIL_ID), &self.secrets.email, "Email")
                    .await?;
                self.click(&id_selector(SUBMIT_BUTTON_ID), "Submit Email")
                    .await
            }
            Screen::Password => {
                self.fill(&id_selector(PWD_ID), &self.secrets.password, "Password")
                    .await?;
                self.click(&id_selector(SUBMIT_BUTTON_ID), "Submit Password")
                    .await
            }
            Screen::Mfa => self.handle_mfa(snapshot, deadline).await,
            Screen::StaySignedIn => {
                let checkbox = id_selector(DONT_SHOW_AGAIN_CHECKBOX_ID);
                if snapshot.is_clickable(&checkbox) {
                    self.click(&checkbox, "Don't show this again").await?;
                }
                self.click(&id_selector(YES_BUTTON_ID), "Stay signed in")
                    .await
            }
            Screen::AllowAccess => {
                let selector = allow_selectors()
                    .into_iter()
                    .find(|s| snapshot.is_clickable(s))
                    .unwrap_or_else(|| allow_selectors()[0].clone());
                self.click(&selector, "Allow Access").await
            }
            Screen::Approved | Screen::Pending => Ok(()),
        }
    }

    async fn handle_mfa(&self, snapshot: &PageSnapshot, deadline: Instant) -> Result<()> {
        let description = match self.page.text(&id_selector(MFA_DESCRIPTION_ID)).await {
            Ok(text) => text,
            Err(e) => {
                debug!("Could not read MFA description: {e:#}");
                None
            }
        };
        info!(
            "MFA screen found. Description: {}",
            description.as_deref().unwrap_or("<none>")
        );

        let limit = self
            .options
            .mfa_timeout
            .min(deadline.saturating_duration_since(Instant::now()));

        let code = time::timeout(limit, self.prompter.mfa_code(description.as_deref()))
            .await
            .map_err(|_| AutomationError::MfaTimeout(limit))??;

        let checkbox = id_selector(MFA_CHECKBOX_ID);
        if self.options.remember_mfa_device && snapshot.is_clickable(&checkbox) {
            self.click(&checkbox, "Don't ask again").await?;
        }

        self.fill(&id_selector(MFA_CODE_INPUT_ID), code.trim(), "MFA Code")
            .await?;
        self.click(&id_selector(MFA_VERIFY_ID), "Verify").await?;
        info!("Submitted MFA code.");
        Ok(())
    }

    /// Poll until the page leaves `screen`, the transition window closes, or the deadline passes
    async fn wait_for_transition(&self, screen: Screen, deadline: Instant) -> Result<()> {
        let until = deadline.min(Instant::now() + self.options.transition_timeout);

        while Instant::now() < until {
            time::sleep(self.options.poll_interval).await;
            let snapshot = self.page.snapshot().await?;
            if Screen::detect(&snapshot) != screen {
                return Ok(());
            }
        }

        debug!("Still on the {} screen after handling it", screen);
        Ok(())
    }

    async fn dismiss_cookie_banner(&self, snapshot: &PageSnapshot) {
        if !snapshot.is_clickable(COOKIE_BANNER_SELECTOR) {
            return;
        }

        match self.page.click(COOKIE_BANNER_SELECTOR).await {
            Ok(()) => info!("Clicked 'Continue without accepting' on the cookie banner."),
            Err(e) => warn!("Unexpected error while dismissing cookie banner: {e}"),
        }
    }

    async fn click(&self, selector: &str, description: &str) -> Result<()> {
        self.page.click(selector).await?;
        info!("Clicked '{}' button.", description);
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str, description: &str) -> Result<()> {
        self.page.fill(selector, text).await?;
        info!("Entered text in '{}' input.", description);
        Ok(())
    }
}
