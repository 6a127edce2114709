//! OS keyring storage for login secrets and credential records
//!
//! Everything lives under one keyring service:
//!
//! - `email` / `password`: the identity provider sign-in
//! - `credentials:<profile>`: role credentials as JSON

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, info};

use crate::{aws::Credentials, constants::SERVICE_NAME, prompt::Prompter};

const EMAIL_ACCOUNT: &str = "email";
const PASSWORD_ACCOUNT: &str = "password";

/// Key-value secret storage addressed by account name
pub trait SecretBackend: Send + Sync {
    fn get(&self, account: &str) -> Result<Option<String>>;
    fn set(&self, account: &str, secret: &str) -> Result<()>;
    /// Deleting a missing secret succeeds
    fn delete(&self, account: &str) -> Result<()>;
}

/// Secret Service on Linux, Keychain on macOS, Credential Manager on Windows
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> Result<Entry> {
        Entry::new(&self.service, account)
            .with_context(|| format!("Failed to access keyring entry '{account}'"))
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl SecretBackend for KeyringBackend {
    fn get(&self, account: &str) -> Result<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Keyring access denied for '{account}'")),
        }
    }

    fn set(&self, account: &str, secret: &str) -> Result<()> {
        self.entry(account)?
            .set_password(secret)
            .with_context(|| format!("Failed to store '{account}' in the keyring"))
    }

    fn delete(&self, account: &str) -> Result<()> {
        match self.entry(account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete '{account}' from the keyring")),
        }
    }
}

pub struct SecretStore {
    backend: Box<dyn SecretBackend>,
}

impl SecretStore {
    pub fn new(backend: impl SecretBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Store backed by the OS keyring
    pub fn keyring() -> Self {
        Self::new(KeyringBackend::default())
    }

    /// Probe whether the backend can be read at all
    pub fn is_available(&self) -> bool {
        self.backend.get(EMAIL_ACCOUNT).is_ok()
    }

    pub fn email(&self) -> Result<Option<String>> {
        self.backend.get(EMAIL_ACCOUNT)
    }

    pub fn set_email(&self, email: &str) -> Result<()> {
        self.backend.set(EMAIL_ACCOUNT, email)
    }

    pub fn password(&self) -> Result<Option<String>> {
        self.backend.get(PASSWORD_ACCOUNT)
    }

    pub fn set_password(&self, password: &str) -> Result<()> {
        self.backend.set(PASSWORD_ACCOUNT, password)
    }

    pub fn clear_login(&self) -> Result<()> {
        self.backend.delete(EMAIL_ACCOUNT)?;
        self.backend.delete(PASSWORD_ACCOUNT)
    }

    pub fn credentials(&self, profile: &str) -> Result<Option<Credentials>> {
        let Some(json) = self.backend.get(&credentials_account(profile))? else {
            return Ok(None);
        };

        let creds = serde_json::from_str(&json).with_context(|| {
            format!("Stored credentials for profile '{profile}' are corrupt")
        })?;
        Ok(Some(creds))
    }

    pub fn save_credentials(&self, profile: &str, creds: &Credentials) -> Result<()> {
        let json = serde_json::to_string(creds)?;
        self.backend.set(&credentials_account(profile), &json)?;
        debug!(profile, "Credentials saved to keyring");
        Ok(())
    }

    pub fn delete_credentials(&self, profile: &str) -> Result<()> {
        self.backend.delete(&credentials_account(profile))
    }
}

fn credentials_account(profile: &str) -> String {
    format!("credentials:{profile}")
}

/// Sign-in email and password
pub struct LoginSecrets {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginSecrets")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Retrieve the email and password from the keyring, prompting for whatever is missing
pub async fn resolve_login(
    store: &SecretStore,
    prompter: &dyn Prompter,
    update_password: bool,
) -> Result<LoginSecrets> {
    let email = match store.email()? {
        Some(email) => email,
        None => {
            let email = prompter.email().await?;
            store.set_email(&email)?;
            email
        }
    };

    let password = match store.password()? {
        Some(password) if !update_password => password,
        _ => {
            let password = prompter.password().await?;
            store.set_password(&password)?;
            info!("Password updated successfully.");
            password
        }
    };

    Ok(LoginSecrets { email, password })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::{collections::HashMap, sync::Mutex};

    /// In-memory backend; `denied` makes every call fail like a locked keyring
    #[derive(Default)]
    pub struct MemoryBackend {
        pub entries: Mutex<HashMap<String, String>>,
        pub denied: bool,
    }

    impl MemoryBackend {
        pub fn denied() -> Self {
            Self {
                denied: true,
                ..Self::default()
            }
        }
    }

    impl SecretBackend for MemoryBackend {
        fn get(&self, account: &str) -> Result<Option<String>> {
            anyhow::ensure!(!self.denied, "Keyring access denied for '{account}'");
            Ok(self.entries.lock().unwrap().get(account).cloned())
        }

        fn set(&self, account: &str, secret: &str) -> Result<()> {
            anyhow::ensure!(!self.denied, "Keyring access denied for '{account}'");
            self.entries
                .lock()
                .unwrap()
                .insert(account.to_string(), secret.to_string());
            Ok(())
        }

        fn delete(&self, account: &str) -> Result<()> {
            anyhow::ensure!(!self.denied, "Keyring access denied for '{account}'");
            self.entries.lock().unwrap().remove(account);
            Ok(())
        }
    }

    /// Prompter that answers from fixed values and counts calls
    #[derive(Default)]
    pub struct ScriptedPrompter {
        pub email: String,
        pub password: String,
        pub mfa_code: String,
        pub calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedPrompter {
        pub fn new(email: &str, password: &str, mfa_code: &str) -> Self {
            Self {
                email: email.to_string(),
                password: password.to_string(),
                mfa_code: mfa_code.to_string(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Prompter for ScriptedPrompter {
        async fn email(&self) -> Result<String> {
            self.calls.lock().unwrap().push("email");
            Ok(self.email.clone())
        }

        async fn password(&self) -> Result<String> {
            self.calls.lock().unwrap().push("password");
            Ok(self.password.clone())
        }

        async fn mfa_code(&self, _description: Option<&str>) -> Result<String> {
            self.calls.lock().unwrap().push("mfa");
            Ok(self.mfa_code.clone())
        }
    }
}
