use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use tracing::{info, warn};

use crate::{
    aws::{cache, sts},
    config,
    constants::EXPIRY_MARGIN,
    secrets::SecretStore,
};

#[derive(Debug, Clone, Args)]
pub struct StatusCommand {
    #[arg(long, help = "Check the stored credentials against AWS STS")]
    pub verify: bool,
}

impl StatusCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        let config = config::load(profile)
            .await
            .with_context(|| format!("Failed to load configuration for profile '{profile}'"))?;
        let now = Utc::now();

        println!("Profile:     {profile}");
        println!("Start URL:   {}", config.sso.start_url);

        let token = cache::find_token(&config.sso.start_url)?;
        match &token {
            Some(token) => {
                info!("Using SSO cache file {}", token.path.display());
                println!("SSO token:   {}", describe_expiry(token.expires_at, now));
            }
            None => println!("SSO token:   not found"),
        }

        let record = match SecretStore::keyring().credentials(profile) {
            Ok(record) => record,
            Err(e) => {
                warn!("Could not read stored credentials: {e:#}");
                None
            }
        };
        match &record {
            Some(creds) => println!(
                "Credentials: {} ({} / {})",
                describe_expiry(creds.expiration, now),
                creds.account_id,
                creds.role_name
            ),
            None => println!("Credentials: none stored"),
        }

        if self.verify {
            let creds = record
                .as_ref()
                .filter(|c| c.is_valid_at(now, EXPIRY_MARGIN))
                .context("No valid stored credentials to verify")?;
            let identity = sts::caller_identity(&config.sso.region, creds)
                .await
                .context("Stored credentials were rejected by AWS STS")?;
            println!("Identity:    {} (account {})", identity.arn, identity.account);
        }

        match token {
            None => bail!("No cached SSO token for profile '{profile}'. Run `sso-autologin login`."),
            Some(token) if !token.is_valid_at(now, EXPIRY_MARGIN) => bail!(
                "SSO token for profile '{profile}' expired at {}. Run `sso-autologin login`.",
                format_time(token.expires_at)
            ),
            Some(_) => Ok(()),
        }
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// "valid until <time> (1h 5m left)" or "expired at <time>"
fn describe_expiry(expiration: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = expiration - now;
    if remaining.num_seconds() <= 0 {
        return format!("expired at {}", format_time(expiration));
    }

    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() % 60;
    let left = if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    };
    format!("valid until {} ({left} left)", format_time(expiration))
}
