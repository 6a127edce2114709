use crate::constants::{
    self, DEFAULT_AWS_REGION, DEFAULT_LOGIN_TIMEOUT_SECS, MAX_LOGIN_TIMEOUT_SECS,
    MIN_LOGIN_TIMEOUT_SECS,
};
use anyhow::{Context, Result, bail};
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use ini::{Ini, Properties};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;

const KEY_CHROME_USER_DATA_DIR: &str = "autologin_chrome_user_data_dir";
const KEY_CHROME_EXECUTABLE: &str = "autologin_chrome_executable";
const KEY_LOGIN_TIMEOUT: &str = "autologin_login_timeout_seconds";
const KEY_STORE_CREDENTIALS: &str = "autologin_store_credentials";
const KEY_WRITE_CREDENTIALS_FILE: &str = "autologin_write_credentials_file";
const KEY_REMEMBER_MFA_DEVICE: &str = "autologin_remember_mfa_device";

/// SSO settings of an AWS profile, as the AWS CLI reads them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoProfile {
    pub start_url: String,
    pub region: String,
    pub account_id: Option<String>,
    pub role_name: Option<String>,
    pub session_name: Option<String>,
}

impl SsoProfile {
    /// Account and role, when both are configured
    pub fn role_target(&self) -> Option<(&str, &str)> {
        self.account_id
            .as_deref()
            .zip(self.role_name.as_deref())
    }
}

/// Tool settings stored alongside the profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub chrome_user_data_dir: PathBuf,
    pub chrome_executable: Option<PathBuf>,
    pub login_timeout_secs: u64,
    pub store_credentials: bool,
    pub write_credentials_file: bool,
    pub remember_mfa_device: bool,
}

impl Settings {
    pub fn defaults() -> Result<Self> {
        Ok(Self {
            chrome_user_data_dir: constants::default_chrome_user_data_dir()?,
            chrome_executable: None,
            login_timeout_secs: DEFAULT_LOGIN_TIMEOUT_SECS,
            store_credentials: false,
            write_credentials_file: false,
            remember_mfa_device: false,
        })
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    fn from_ini_section(section: &Properties) -> Result<Self> {
        let chrome_user_data_dir = match section.get(KEY_CHROME_USER_DATA_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => constants::default_chrome_user_data_dir()?,
        };

        Ok(Self {
            chrome_user_data_dir,
            chrome_executable: section
                .get(KEY_CHROME_EXECUTABLE)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            login_timeout_secs: section
                .get(KEY_LOGIN_TIMEOUT)
                .and_then(|s| s.parse().ok())
                .filter(|secs| is_valid_login_timeout(*secs))
                .unwrap_or(DEFAULT_LOGIN_TIMEOUT_SECS),
            store_credentials: parse_bool(section.get(KEY_STORE_CREDENTIALS)),
            write_credentials_file: parse_bool(section.get(KEY_WRITE_CREDENTIALS_FILE)),
            remember_mfa_device: parse_bool(section.get(KEY_REMEMBER_MFA_DEVICE)),
        })
    }

    fn save_to_ini(&self, ini: &mut Ini, profile: &str) {
        ini.with_section(Some(section_name(profile)))
            .set(
                KEY_CHROME_USER_DATA_DIR,
                self.chrome_user_data_dir.to_string_lossy(),
            )
            .set(KEY_LOGIN_TIMEOUT, self.login_timeout_secs.to_string())
            .set(KEY_STORE_CREDENTIALS, self.store_credentials.to_string())
            .set(
                KEY_WRITE_CREDENTIALS_FILE,
                self.write_credentials_file.to_string(),
            )
            .set(KEY_REMEMBER_MFA_DEVICE, self.remember_mfa_device.to_string());

        match &self.chrome_executable {
            Some(executable) => {
                ini.with_section(Some(section_name(profile)))
                    .set(KEY_CHROME_EXECUTABLE, executable.to_string_lossy());
            }
            None => {
                ini.delete_from(Some(section_name(profile)), KEY_CHROME_EXECUTABLE);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub profile: String,
    pub sso: SsoProfile,
    pub settings: Settings,
}

pub async fn load(profile: &str) -> Result<Config> {
    load_from(&get_config_path()?, profile)
}

/// Load the profile's SSO settings and tool settings from an AWS config file
pub fn load_from(path: &Path, profile: &str) -> Result<Config> {
    let ini = Ini::load_from_file(path)
        .with_context(|| format!("Failed to load AWS config file {}", path.display()))?;

    let section = ini
        .section(Some(section_name(profile)))
        .with_context(|| format!("Profile '{profile}' not found in AWS config"))?;

    Ok(Config {
        profile: profile.to_string(),
        sso: resolve_sso_profile(&ini, section, profile)?,
        settings: Settings::from_ini_section(section)?,
    })
}

/// Load only the tool settings, falling back to defaults when the file or profile is missing
pub fn load_settings_from(path: &Path, profile: &str) -> Result<Settings> {
    let ini = match Ini::load_from_file(path) {
        Ok(ini) => ini,
        Err(_) => return Settings::defaults(),
    };

    match ini.section(Some(section_name(profile))) {
        Some(section) => Settings::from_ini_section(section),
        None => Settings::defaults(),
    }
}

pub async fn save(profile: &str, settings: &Settings) -> Result<()> {
    save_to(&get_config_path()?, profile, settings).await
}

pub async fn save_to(path: &Path, profile: &str, settings: &Settings) -> Result<()> {
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

    settings.save_to_ini(&mut ini, profile);

    ini.write_to_file(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

pub async fn configure_interactive(profile: &str) -> Result<Settings> {
    println!("Configuring sso-autologin for profile: {profile}");

    let path = get_config_path()?;
    let current = load_settings_from(&path, profile)?;

    println!("Press Enter to keep current values, or type new values.");
    println!();

    let theme = ColorfulTheme::default();

    let chrome_user_data_dir = Input::<String>::with_theme(&theme)
        .with_prompt("Chrome User Data Directory")
        .default(current.chrome_user_data_dir.to_string_lossy().to_string())
        .interact_text()
        .context("Failed to read Chrome user data directory")?;

    let chrome_executable = Input::<String>::with_theme(&theme)
        .with_prompt("Chrome executable (empty to auto-detect)")
        .default(
            current
                .chrome_executable
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
        )
        .allow_empty(true)
        .interact_text()
        .context("Failed to read Chrome executable")?;

    let login_timeout_secs = Input::<u64>::with_theme(&theme)
        .with_prompt(format!(
            "Login timeout in seconds ({MIN_LOGIN_TIMEOUT_SECS}-{MAX_LOGIN_TIMEOUT_SECS})"
        ))
        .default(current.login_timeout_secs)
        .validate_with(|input: &u64| {
            if is_valid_login_timeout(*input) {
                Ok(())
            } else {
                Err("Please enter a value between 30 and 1800")
            }
        })
        .interact_text()
        .context("Failed to read login timeout")?;

    let store_credentials = Confirm::with_theme(&theme)
        .with_prompt("Store role credentials in the OS keyring after login?")
        .default(current.store_credentials)
        .interact()
        .context("Failed to read keyring preference")?;

    let write_credentials_file = Confirm::with_theme(&theme)
        .with_prompt("Write role credentials to the shared credentials file after login?")
        .default(current.write_credentials_file)
        .interact()
        .context("Failed to read credentials file preference")?;

    let remember_mfa_device = Confirm::with_theme(&theme)
        .with_prompt("Tick \"don't ask again\" on MFA prompts?")
        .default(current.remember_mfa_device)
        .interact()
        .context("Failed to read MFA preference")?;

    let settings = Settings {
        chrome_user_data_dir: PathBuf::from(chrome_user_data_dir),
        chrome_executable: (!chrome_executable.is_empty()).then(|| PathBuf::from(chrome_executable)),
        login_timeout_secs,
        store_credentials,
        write_credentials_file,
        remember_mfa_device,
    };

    save_to(&path, profile, &settings).await?;

    println!("\nConfiguration saved to {}.", path.display());
    Ok(settings)
}

fn resolve_sso_profile(ini: &Ini, section: &Properties, profile: &str) -> Result<SsoProfile> {
    let session_name = section.get("sso_session").map(str::to_string);

    let session = match &session_name {
        Some(name) => Some(
            ini.section(Some(format!("sso-session {name}")))
                .with_context(|| {
                    format!("sso-session '{name}' referenced by profile '{profile}' not found")
                })?,
        ),
        None => None,
    };

    let lookup = |key: &str| {
        section
            .get(key)
            .or_else(|| session.and_then(|s| s.get(key)))
            .map(str::to_string)
    };

    let Some(start_url) = lookup("sso_start_url") else {
        bail!("Profile '{profile}' has no sso_start_url. Is it an SSO profile?");
    };

    let region = lookup("sso_region")
        .or_else(|| section.get("region").map(str::to_string))
        .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());

    Ok(SsoProfile {
        start_url,
        region,
        account_id: section.get("sso_account_id").map(str::to_string),
        role_name: section.get("sso_role_name").map(str::to_string),
        session_name,
    })
}

fn section_name(profile: &str) -> String {
    if profile == "default" {
        profile.to_string()
    } else {
        format!("profile {profile}")
    }
}

fn parse_bool(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "yes" | "1" | "on")
    )
}

fn is_valid_login_timeout(secs: u64) -> bool {
    (MIN_LOGIN_TIMEOUT_SECS..=MAX_LOGIN_TIMEOUT_SECS).contains(&secs)
}

fn get_config_path() -> Result<PathBuf> {
    constants::get_aws_config_path().context("Failed to determine AWS config path")
}
