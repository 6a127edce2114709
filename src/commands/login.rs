use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    aws::{self, SsoToken, cache, cli::SsoLogin, sso},
    browser::{ChromePage, ChromeSession, LaunchOptions},
    config::{self, Config, Settings},
    constants::{self, EXPIRY_MARGIN, MAX_LOGIN_TIMEOUT_SECS, MIN_LOGIN_TIMEOUT_SECS},
    login::{Automator, AutomatorOptions},
    prompt::TerminalPrompter,
    secrets::{self, LoginSecrets, SecretStore},
};

/// How long the AWS CLI gets to pick up the approval and write its cache
const CLI_EXIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, Args)]
pub struct LoginCommand {
    #[arg(long, help = "Prompt for the password again and update the keyring")]
    pub update_password: bool,

    #[arg(long, help = "Show the browser window")]
    pub headed: bool,

    #[arg(long, help = "Show the browser and save a screenshot if the login fails")]
    pub debug: bool,

    #[arg(long, help = "Log in even if the cached SSO token is still valid")]
    pub force: bool,

    #[arg(long, help = "Use the device code flow instead of PKCE")]
    pub use_device_code: bool,

    #[arg(
        long,
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(MIN_LOGIN_TIMEOUT_SECS..=MAX_LOGIN_TIMEOUT_SECS),
        help = "Deadline for the browser flow"
    )]
    pub timeout: Option<u64>,

    #[arg(long, help = "Store role credentials in the OS keyring")]
    pub store_credentials: bool,

    #[arg(long, help = "Write role credentials to the shared credentials file")]
    pub write_credentials: bool,
}

impl LoginCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        info!("Starting SSO login for profile: {}", profile);

        let config = config::load(profile)
            .await
            .with_context(|| format!("Failed to load configuration for profile '{profile}'. Is it an SSO profile in your AWS config?"))?;
        let settings = self.apply_overrides(config.settings.clone());
        let store = SecretStore::keyring();

        let cached = cache::find_token(&config.sso.start_url)?;

        let token = match reusable_token(cached, self.force, Utc::now()) {
            Some(token) => {
                println!(
                    "SSO token for profile {profile} is still valid. Use --force to log in again."
                );
                token
            }
            None => {
                self.browser_login(&config, &settings, &store).await?;
                cache::find_token(&config.sso.start_url)?
                    .context("AWS CLI finished but no SSO token was found in the cache")?
            }
        };

        if settings.store_credentials || settings.write_credentials_file {
            self.persist_role_credentials(&config, &settings, &token, &store)
                .await?;
        }

        println!("AWS SSO login for profile {profile} completed successfully.");
        println!(
            "SSO token expires at: {}",
            token.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        Ok(())
    }

    fn apply_overrides(&self, mut settings: Settings) -> Settings {
        if let Some(timeout) = self.timeout {
            settings.login_timeout_secs = timeout;
        }
        settings.store_credentials |= self.store_credentials;
        settings.write_credentials_file |= self.write_credentials;
        settings
    }

    async fn browser_login(
        &self,
        config: &Config,
        settings: &Settings,
        store: &SecretStore,
    ) -> Result<()> {
        let secrets = secrets::resolve_login(store, &TerminalPrompter, self.update_password)
            .await
            .context("Failed to get sign-in credentials")?;

        let sso_login = SsoLogin::start(&config.profile, self.use_device_code).await?;

        let options = LaunchOptions {
            user_data_dir: settings.chrome_user_data_dir.clone(),
            executable: settings.chrome_executable.clone(),
            headed: self.headed || self.debug,
        };
        let session = ChromeSession::launch(&options).await?;

        // The browser is closed on every path before the result is looked at.
        let result = self
            .drive(&session, &sso_login.url, settings, &secrets)
            .await;
        session.close().await;
        result?;

        sso_login.wait(CLI_EXIT_TIMEOUT).await
    }

    async fn drive(
        &self,
        session: &ChromeSession,
        url: &str,
        settings: &Settings,
        secrets: &LoginSecrets,
    ) -> Result<()> {
        let page = session.open(url).await?;

        let options = AutomatorOptions {
            timeout: settings.login_timeout(),
            remember_mfa_device: settings.remember_mfa_device,
            ..AutomatorOptions::default()
        };
        let result = Automator::new(&page, &TerminalPrompter, secrets, options)
            .run()
            .await;

        if result.is_err() && self.debug {
            save_failure_screenshot(&page).await;
        }

        result
    }

    async fn persist_role_credentials(
        &self,
        config: &Config,
        settings: &Settings,
        token: &SsoToken,
        store: &SecretStore,
    ) -> Result<()> {
        let Some((account_id, role_name)) = config.sso.role_target() else {
            warn!(
                "Profile '{}' has no sso_account_id and sso_role_name; not saving role credentials",
                config.profile
            );
            return Ok(());
        };

        let region = token.region.as_deref().unwrap_or(&config.sso.region);
        let creds = sso::get_role_credentials(region, account_id, role_name, &token.access_token)
            .await?;

        if settings.store_credentials {
            store
                .save_credentials(&config.profile, &creds)
                .context("Failed to store role credentials in the keyring")?;
            println!("Role credentials stored in the keyring.");
        }

        if settings.write_credentials_file {
            aws::credentials::save_credentials(&config.profile, &creds)
                .await
                .context("Failed to save AWS credentials")?;
            println!("Role credentials saved to the {} profile.", config.profile);
        }

        println!("Credentials will expire at: {}", creds.expiration_rfc3339());
        Ok(())
    }
}

/// The cached token, unless it is forced out or expires within the margin
fn reusable_token(cached: Option<SsoToken>, force: bool, now: DateTime<Utc>) -> Option<SsoToken> {
    cached.filter(|token| !force && token.is_valid_at(now, EXPIRY_MARGIN))
}

async fn save_failure_screenshot(page: &ChromePage) {
    let path = match constants::screenshot_dir() {
        Ok(dir) => dir.join(format!("failure-{}.png", Utc::now().format("%Y%m%d-%H%M%S"))),
        Err(e) => {
            warn!("Cannot save screenshot: {e:#}");
            return;
        }
    };

    match page.screenshot(&path).await {
        Ok(()) => eprintln!("Screenshot of the failed page saved to {}", path.display()),
        Err(e) => warn!("Failed to save screenshot: {e:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SsoProfile, secrets::testing::MemoryBackend};
    use chrono::Duration as ChronoDuration;
    use std::path::PathBuf;

    fn token_expiring_at(expires_at: DateTime<Utc>) -> SsoToken {
        SsoToken {
            start_url: "https://d-1234567890.awsapps.com/start".to_string(),
            region: Some("eu-west-1".to_string()),
            access_token: "aoaAAAAA".to_string(),
            expires_at,
            has_refresh_token: false,
            path: PathBuf::from("/tmp/cache.json"),
        }
    }

    fn config_without_role() -> Config {
        Config {
            profile: "prod".to_string(),
            sso: SsoProfile {
                start_url: "https://d-1234567890.awsapps.com/start".to_string(),
                region: "eu-west-1".to_string(),
                account_id: Some("123456789012".to_string()),
                role_name: None,
                session_name: None,
            },
            settings: settings(),
        }
    }

    fn settings() -> Settings {
        Settings {
            chrome_user_data_dir: PathBuf::from("/tmp/chrome"),
            chrome_executable: None,
            login_timeout_secs: 300,
            store_credentials: false,
            write_credentials_file: true,
            remember_mfa_device: false,
        }
    }

    #[test]
    fn test_apply_overrides_without_flags_keeps_settings() {
        let cmd = LoginCommand::default();
        assert_eq!(cmd.apply_overrides(settings()), settings());
    }

    #[test]
    fn test_apply_overrides_flags_enable_and_never_disable() {
        let cmd = LoginCommand {
            timeout: Some(90),
            store_credentials: true,
            ..LoginCommand::default()
        };

        let merged = cmd.apply_overrides(settings());
        assert_eq!(merged.login_timeout_secs, 90);
        assert_eq!(merged.login_timeout(), Duration::from_secs(90));
        assert!(merged.store_credentials);
        assert!(merged.write_credentials_file);
    }

    #[test]
    fn test_reusable_token_valid_is_reused() {
        let now = Utc::now();
        let token = token_expiring_at(now + ChronoDuration::hours(8));

        let reused = reusable_token(Some(token), false, now).unwrap();
        assert_eq!(reused.access_token, "aoaAAAAA");
    }

    #[test]
    fn test_reusable_token_expired_or_missing() {
        let now = Utc::now();
        let token = token_expiring_at(now - ChronoDuration::minutes(1));

        assert!(reusable_token(Some(token), false, now).is_none());
        assert!(reusable_token(None, false, now).is_none());
    }

    #[test]
    fn test_reusable_token_within_margin_is_not_reused() {
        let now = Utc::now();
        let token = token_expiring_at(now + ChronoDuration::minutes(2));

        assert!(reusable_token(Some(token), false, now).is_none());
    }

    #[test]
    fn test_reusable_token_force_logs_in_again() {
        let now = Utc::now();
        let token = token_expiring_at(now + ChronoDuration::hours(8));

        assert!(reusable_token(Some(token), true, now).is_none());
    }

    #[tokio::test]
    async fn test_persist_without_role_skips_quietly() {
        let cmd = LoginCommand::default();
        let config = config_without_role();
        let settings = Settings {
            store_credentials: true,
            write_credentials_file: false,
            ..settings()
        };
        let store = SecretStore::new(MemoryBackend::default());
        let token = token_expiring_at(Utc::now() + ChronoDuration::hours(8));

        cmd.persist_role_credentials(&config, &settings, &token, &store)
            .await
            .unwrap();

        assert_eq!(store.credentials("prod").unwrap(), None);
    }
}
