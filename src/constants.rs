use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use dirs;

/// Default configuration directory name under `~/.config`
pub const CONFIG_DIR_NAME: &str = "sso-autologin";

/// Chrome user data directory name
pub const CHROME_USER_DATA_DIR_NAME: &str = "chrome-user-data";

/// AWS configuration directory name
pub const AWS_CONFIG_DIR_NAME: &str = ".aws";

/// AWS configuration file name
pub const AWS_CONFIG_FILE_NAME: &str = "config";

/// Keyring service under which login secrets and credential records live
pub const SERVICE_NAME: &str = "aws_sso_login";

/// Default AWS region when a profile has neither `sso_region` nor `region`
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

// Element IDs and selectors of the AWS device pages and the Entra sign-in pages.
pub const CONFIRM_ID: &str = "cli_verification_btn";
pub const ALLOW_ID: &str = "cli_login_button";
pub const ALLOW_SELECTOR: &str = "[data-testid='allow-access-button']";
pub const EMAIL_ID: &str = "i0116";
pub const PWD_ID: &str = "i0118";
pub const SUBMIT_BUTTON_ID: &str = "idSIButton9";
pub const MFA_DESCRIPTION_ID: &str = "idDiv_SAOTCC_Description";
pub const MFA_CHECKBOX_ID: &str = "idChkBx_SAOTCC_TD";
pub const MFA_CODE_INPUT_ID: &str = "idTxtBx_SAOTCC_OTC";
pub const MFA_VERIFY_ID: &str = "idSubmit_SAOTCC_Continue";
pub const DONT_SHOW_AGAIN_CHECKBOX_ID: &str = "KmsiCheckboxField";
pub const YES_BUTTON_ID: &str = "idSIButton9";
pub const COOKIE_BANNER_SELECTOR: &str = "button[data-id='awsccc-cb-btn-continue']";

/// Lowercased page text fragments that mean the device request was approved
pub const SUCCESS_TEXT_PATTERNS: &[&str] = &[
    "request approved",
    "you can close this window",
    "you have successfully logged into aws",
];

/// Wait for a single element or page transition
pub const MAX_WAIT_TIME: Duration = Duration::from_secs(30);

/// How long a handled screen gets to change before it is handled again
pub const SCREEN_TRANSITION_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval of the login state machine
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Times a single screen may be handled before the login is considered stuck
pub const MAX_SCREEN_ATTEMPTS: u32 = 3;

/// Navigation attempts before giving up on the login page
pub const NAVIGATION_ATTEMPTS: u32 = 3;

/// Default overall deadline for the browser flow, in seconds
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 300;

/// Bounds accepted for the login timeout setting
pub const MIN_LOGIN_TIMEOUT_SECS: u64 = 30;
pub const MAX_LOGIN_TIMEOUT_SECS: u64 = 1800;

/// Time the user gets to type an MFA code
pub const MFA_PROMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Tokens and credentials closer than this to expiry are treated as expired
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().or_else(|| {
        env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from)
    })
}

/// Get the default Chrome user data directory path
/// Always returns: ~/.config/sso-autologin/chrome-user-data (on all platforms)
pub fn default_chrome_user_data_dir() -> Result<PathBuf> {
    let home = home_dir()
        .context("Could not determine home directory. Please set HOME environment variable.")?;

    Ok(home
        .join(".config")
        .join(CONFIG_DIR_NAME)
        .join(CHROME_USER_DATA_DIR_NAME))
}

/// Directory where failure screenshots are written
pub fn screenshot_dir() -> Result<PathBuf> {
    let home = home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join(CONFIG_DIR_NAME).join("screenshots"))
}

/// Get the AWS config file path
/// Respects AWS_CONFIG_FILE environment variable if set
pub fn get_aws_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }

    home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join(AWS_CONFIG_FILE_NAME))
}

/// Get the AWS credentials file path
/// Respects AWS_SHARED_CREDENTIALS_FILE environment variable if set
pub fn get_aws_credentials_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_SHARED_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }

    home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join("credentials"))
}

/// Directory where the AWS CLI caches SSO tokens
pub fn get_sso_cache_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join("sso").join("cache"))
}

/// CSS selector for an element id
pub fn id_selector(id: &str) -> String {
    format!("#{id}")
}
