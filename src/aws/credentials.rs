use anyhow::{Context, Result};
use ini::Ini;
use std::path::Path;
use tokio::fs;
use tracing;

use super::Credentials;
use crate::constants;

/// Save credentials to the shared AWS credentials file
pub async fn save_credentials(profile: &str, creds: &Credentials) -> Result<()> {
    let path = constants::get_aws_credentials_path()
        .context("Failed to determine AWS credentials path")?;
    save_credentials_to(&path, profile, creds).await
}

pub async fn save_credentials_to(path: &Path, profile: &str, creds: &Credentials) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut ini = if path.exists() {
        Ini::load_from_file(path)
            .with_context(|| format!("Refusing to overwrite unreadable {}", path.display()))?
    } else {
        Ini::new()
    };

    ini.with_section(Some(profile))
        .set("aws_access_key_id", &creds.access_key_id)
        .set("aws_secret_access_key", &creds.secret_access_key)
        .set("aws_session_token", &creds.session_token)
        .set("aws_session_expiration", creds.expiration_rfc3339());

    // Secrets only ever land in a file that is already private.
    #[cfg(unix)]
    restrict_to_owner(path).await?;

    ini.write_to_file(path)
        .context("Failed to write credentials file")?;

    tracing::info!("Credentials saved to profile: {}", profile);
    Ok(())
}

/// Create the file if needed and set it to 0600
#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::{fs::Permissions, os::unix::fs::PermissionsExt};

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.set_permissions(Permissions::from_mode(0o600))
        .await
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample() -> Credentials {
        Credentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            account_id: "123456789012".to_string(),
            role_name: "Admin".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_creates_file_and_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("credentials");

        save_credentials_to(&path, "prod", &sample()).await.unwrap();

        let ini = Ini::load_from_file(&path).unwrap();
        let section = ini.section(Some("prod")).unwrap();
        assert_eq!(section.get("aws_access_key_id"), Some("ASIAEXAMPLE"));
        assert_eq!(section.get("aws_session_token"), Some("token"));
        assert_eq!(
            section.get("aws_session_expiration"),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_save_keeps_other_profiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, "[other]\naws_access_key_id = AKIAOTHER\n").unwrap();

        save_credentials_to(&path, "prod", &sample()).await.unwrap();

        let ini = Ini::load_from_file(&path).unwrap();
        assert_eq!(
            ini.section(Some("other")).unwrap().get("aws_access_key_id"),
            Some("AKIAOTHER")
        );
        assert!(ini.section(Some("prod")).is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        save_credentials_to(&path, "prod", &sample()).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_tightens_existing_open_file_before_writing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, "[other]\naws_access_key_id = AKIAOTHER\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        restrict_to_owner(&path).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[other]\naws_access_key_id = AKIAOTHER\n"
        );

        save_credentials_to(&path, "prod", &sample()).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
