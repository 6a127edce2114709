use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use super::is_before_with_margin;
use crate::constants;

/// SSO access token cached by the AWS CLI under `~/.aws/sso/cache`
#[derive(Debug, Clone)]
pub struct SsoToken {
    pub start_url: String,
    pub region: Option<String>,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub has_refresh_token: bool,
    pub path: PathBuf,
}

impl SsoToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        is_before_with_margin(now, self.expires_at, margin)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    start_url: Option<String>,
    region: Option<String>,
    access_token: Option<String>,
    expires_at: Option<String>,
    refresh_token: Option<String>,
}

/// Find the freshest cached token for a start URL
pub fn find_token(start_url: &str) -> Result<Option<SsoToken>> {
    let dir = constants::get_sso_cache_dir().context("Failed to determine SSO cache path")?;
    find_token_in(&dir, start_url)
}

pub fn find_token_in(dir: &Path, start_url: &str) -> Result<Option<SsoToken>> {
    if !dir.exists() {
        debug!("SSO cache directory {} does not exist", dir.display());
        return Ok(None);
    }

    let wanted = normalize_start_url(start_url);
    let mut best: Option<SsoToken> = None;

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read SSO cache directory {}", dir.display()))?;

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let Some(token) = read_token(&path) else {
            continue;
        };

        if normalize_start_url(&token.start_url) != wanted {
            continue;
        }

        if best
            .as_ref()
            .is_none_or(|current| token.expires_at > current.expires_at)
        {
            best = Some(token);
        }
    }

    Ok(best)
}

fn read_token(path: &Path) -> Option<SsoToken> {
    let contents = fs::read_to_string(path).ok()?;
    let entry: CacheEntry = match serde_json::from_str(&contents) {
        Ok(entry) => entry,
        Err(e) => {
            debug!("Skipping unreadable cache file {}: {}", path.display(), e);
            return None;
        }
    };

    // Client registration files carry no access token.
    let access_token = entry.access_token?;
    let start_url = entry.start_url?;
    let expires_at = parse_expires_at(entry.expires_at.as_deref()?)?;

    Some(SsoToken {
        start_url,
        region: entry.region,
        access_token,
        expires_at,
        has_refresh_token: entry.refresh_token.is_some(),
        path: path.to_path_buf(),
    })
}

/// Parse `expiresAt` as written by AWS CLI v2 (RFC 3339) or v1 (`...UTC`)
pub fn parse_expires_at(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let trimmed = value.strip_suffix("UTC").unwrap_or(value);
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn normalize_start_url(url: &str) -> &str {
    url.trim().trim_end_matches(['/', '#'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::TempDir;

    const START_URL: &str = "https://corp.awsapps.com/start";

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_parse_expires_at_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_expires_at("2026-05-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_expires_at("2026-05-01T12:30:00UTC"), Some(expected));
        assert_eq!(parse_expires_at("2026-05-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_expires_at("yesterday"), None);
    }

    #[test]
    fn test_find_token_picks_latest_matching_entry() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "old.json",
            r#"{"startUrl":"https://corp.awsapps.com/start","region":"eu-west-1","accessToken":"old","expiresAt":"2026-05-01T10:00:00Z"}"#,
        );
        write(
            dir.path(),
            "new.json",
            r#"{"startUrl":"https://corp.awsapps.com/start/#","region":"eu-west-1","accessToken":"new","expiresAt":"2026-05-01T18:00:00Z","refreshToken":"r"}"#,
        );
        write(
            dir.path(),
            "other.json",
            r#"{"startUrl":"https://other.awsapps.com/start","accessToken":"other","expiresAt":"2026-06-01T00:00:00Z"}"#,
        );

        let token = find_token_in(dir.path(), START_URL).unwrap().unwrap();
        assert_eq!(token.access_token, "new");
        assert!(token.has_refresh_token);
        assert_eq!(token.region.as_deref(), Some("eu-west-1"));
        assert!(token.path.ends_with("new.json"));
    }

    #[test]
    fn test_find_token_ignores_registrations_and_garbage() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "botocore-client-id-eu-west-1.json",
            r#"{"clientId":"abc","clientSecret":"def","expiresAt":"2026-05-01T10:00:00Z"}"#,
        );
        write(dir.path(), "broken.json", "{not json");
        write(dir.path(), "notes.txt", "hello");

        assert!(find_token_in(dir.path(), START_URL).unwrap().is_none());
    }

    #[test]
    fn test_missing_cache_dir_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("sso").join("cache");
        assert!(find_token_in(&missing, START_URL).unwrap().is_none());
    }

    #[test]
    fn test_token_validity() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let token = SsoToken {
            start_url: START_URL.to_string(),
            region: None,
            access_token: "t".to_string(),
            expires_at: now + ChronoDuration::minutes(3),
            has_refresh_token: false,
            path: PathBuf::from("x.json"),
        };

        assert!(token.is_valid_at(now, Duration::from_secs(60)));
        assert!(!token.is_valid_at(now, constants::EXPIRY_MARGIN));
    }
}
