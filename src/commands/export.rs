use anyhow::{Context, Result, ensure};
use chrono::Utc;
use clap::{Args, ValueEnum};
use serde::Serialize;

use crate::{aws::Credentials, constants::EXPIRY_MARGIN, secrets::SecretStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// `export KEY=value` lines for a POSIX shell
    Env,
    Json,
    /// Output of an AWS `credential_process`
    CredentialProcess,
}

#[derive(Debug, Clone, Args)]
pub struct ExportCommand {
    #[arg(short = 'f', long, value_enum, default_value_t = ExportFormat::Env, help = "Output format")]
    pub format: ExportFormat,
}

/// https://docs.aws.amazon.com/cli/latest/userguide/cli-configure-sourcing-external.html
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialProcessOutput<'a> {
    version: u8,
    access_key_id: &'a str,
    secret_access_key: &'a str,
    session_token: &'a str,
    expiration: String,
}

impl ExportCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        let creds = SecretStore::keyring()
            .credentials(profile)?
            .with_context(|| {
                format!(
                    "No stored credentials for profile '{profile}'. Run `sso-autologin login --store-credentials` first."
                )
            })?;

        ensure!(
            creds.is_valid_at(Utc::now(), EXPIRY_MARGIN),
            "Stored credentials for profile '{profile}' expired at {}. Run `sso-autologin login --store-credentials` to refresh them.",
            creds.expiration_rfc3339()
        );

        print!("{}", render(&creds, self.format)?);
        Ok(())
    }
}

fn render(creds: &Credentials, format: ExportFormat) -> Result<String> {
    let text = match format {
        ExportFormat::Env => format!(
            "export AWS_ACCESS_KEY_ID={}\nexport AWS_SECRET_ACCESS_KEY={}\nexport AWS_SESSION_TOKEN={}\nexport AWS_CREDENTIAL_EXPIRATION={}\n",
            creds.access_key_id,
            creds.secret_access_key,
            creds.session_token,
            creds.expiration_rfc3339()
        ),
        ExportFormat::Json => format!("{}\n", serde_json::to_string_pretty(creds)?),
        ExportFormat::CredentialProcess => {
            let output = CredentialProcessOutput {
                version: 1,
                access_key_id: &creds.access_key_id,
                secret_access_key: &creds.secret_access_key,
                session_token: &creds.session_token,
                expiration: creds.expiration_rfc3339(),
            };
            format!("{}\n", serde_json::to_string(&output)?)
        }
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    fn creds() -> Credentials {
        Credentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI".to_string(),
            session_token: "FwoGZXIvYXdzE".to_string(),
            expiration: Utc.with_ymd_and_hms(2026, 10, 19, 12, 30, 0).unwrap(),
            account_id: "123456789012".to_string(),
            role_name: "Admin".to_string(),
        }
    }

    #[test]
    fn test_render_env() {
        let text = render(&creds(), ExportFormat::Env).unwrap();
        assert_eq!(
            text,
            "export AWS_ACCESS_KEY_ID=ASIAEXAMPLE\n\
             export AWS_SECRET_ACCESS_KEY=wJalrXUtnFEMI\n\
             export AWS_SESSION_TOKEN=FwoGZXIvYXdzE\n\
             export AWS_CREDENTIAL_EXPIRATION=2026-10-19T12:30:00Z\n"
        );
    }

    #[test]
    fn test_render_credential_process() {
        let text = render(&creds(), ExportFormat::CredentialProcess).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["Version"], 1);
        assert_eq!(value["AccessKeyId"], "ASIAEXAMPLE");
        assert_eq!(value["SecretAccessKey"], "wJalrXUtnFEMI");
        assert_eq!(value["SessionToken"], "FwoGZXIvYXdzE");
        assert_eq!(value["Expiration"], "2026-10-19T12:30:00Z");
        assert!(value.get("AccountId").is_none());
    }

    #[test]
    fn test_render_json_includes_account_and_role() {
        let text = render(&creds(), ExportFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["account_id"], "123456789012");
        assert_eq!(value["role_name"], "Admin");
        assert_eq!(value["access_key_id"], "ASIAEXAMPLE");
    }
}
