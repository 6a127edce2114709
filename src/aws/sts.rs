use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::{Client as StsClient, config::Credentials as SdkCredentials};
use std::time::SystemTime;
use tracing::{debug, info};

use super::Credentials;

/// Identity the credentials resolve to
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

/// Check stored credentials against STS GetCallerIdentity
pub async fn caller_identity(region: &str, creds: &Credentials) -> Result<CallerIdentity> {
    info!("Calling AWS STS GetCallerIdentity");
    debug!("Region: {}", region);

    let provider = SdkCredentials::new(
        creds.access_key_id.clone(),
        creds.secret_access_key.clone(),
        Some(creds.session_token.clone()),
        Some(SystemTime::from(creds.expiration)),
        "sso-autologin",
    );

    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .credentials_provider(provider)
        .load()
        .await;

    let response = StsClient::new(&config)
        .get_caller_identity()
        .send()
        .await
        .context("Failed to verify credentials with AWS STS")?;

    Ok(CallerIdentity {
        account: response.account().unwrap_or_default().to_string(),
        arn: response.arn().unwrap_or_default().to_string(),
        user_id: response.user_id().unwrap_or_default().to_string(),
    })
}
