use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod cache;
pub mod cli;
pub mod credentials;
pub mod sso;
pub mod sts;

/// AWS temporary credentials for one account and role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
    pub account_id: String,
    pub role_name: String,
}

impl Credentials {
    /// Whether the credentials stay valid for at least `margin` after `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        is_before_with_margin(now, self.expiration, margin)
    }

    pub fn expiration_rfc3339(&self) -> String {
        self.expiration.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// `now + margin < expiration`, treating an unrepresentable margin as infinite
pub(crate) fn is_before_with_margin(
    now: DateTime<Utc>,
    expiration: DateTime<Utc>,
    margin: Duration,
) -> bool {
    ChronoDuration::from_std(margin)
        .ok()
        .and_then(|m| now.checked_add_signed(m))
        .is_some_and(|deadline| deadline < expiration)
}

pub use cache::SsoToken;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credentials_expiring_at(expiration: DateTime<Utc>) -> Credentials {
        Credentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration,
            account_id: "123456789012".to_string(),
            role_name: "Admin".to_string(),
        }
    }

    #[test]
    fn test_validity_respects_margin() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let creds = credentials_expiring_at(now + ChronoDuration::minutes(10));

        assert!(creds.is_valid_at(now, Duration::from_secs(60)));
        assert!(creds.is_valid_at(now, Duration::from_secs(9 * 60)));
        assert!(!creds.is_valid_at(now, Duration::from_secs(10 * 60)));
        assert!(!creds.is_valid_at(now + ChronoDuration::hours(1), Duration::ZERO));
    }

    #[test]
    fn test_expiration_rfc3339() {
        let creds =
            credentials_expiring_at(Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap());
        assert_eq!(creds.expiration_rfc3339(), "2026-03-04T05:06:07Z");
    }

    #[test]
    fn test_record_json_round_trip_keeps_expiry() {
        let creds =
            credentials_expiring_at(Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap());
        let json = serde_json::to_string(&creds).unwrap();
        let parsed: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, creds);
    }
}
