use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sso::Client as SsoClient;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::Credentials;

/// Exchange an SSO access token for role credentials
pub async fn get_role_credentials(
    region: &str,
    account_id: &str,
    role_name: &str,
    access_token: &str,
) -> Result<Credentials> {
    info!("Calling AWS SSO GetRoleCredentials");
    debug!("Region: {}", region);
    debug!("Account: {}", account_id);
    debug!("Role: {}", role_name);

    // The SSO portal API is authorized by the bearer token, not by SigV4.
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .no_credentials()
        .load()
        .await;

    let client = SsoClient::new(&config);

    let response = client
        .get_role_credentials()
        .account_id(account_id)
        .role_name(role_name)
        .access_token(access_token)
        .send()
        .await
        .context("Failed to get role credentials from AWS SSO")?;

    let role_creds = response
        .role_credentials()
        .context("AWS SSO returned no credentials")?;

    let credentials = Credentials {
        access_key_id: role_creds
            .access_key_id()
            .context("AWS SSO returned no access key id")?
            .to_string(),
        secret_access_key: role_creds
            .secret_access_key()
            .context("AWS SSO returned no secret access key")?
            .to_string(),
        session_token: role_creds
            .session_token()
            .context("AWS SSO returned no session token")?
            .to_string(),
        expiration: expiration_from_millis(role_creds.expiration())?,
        account_id: account_id.to_string(),
        role_name: role_name.to_string(),
    };

    info!("Successfully obtained AWS credentials");
    Ok(credentials)
}

fn expiration_from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .with_context(|| format!("Invalid credential expiration: {millis}"))
}
