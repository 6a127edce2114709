use anyhow::{Context, Result};
use clap::Args;
use dialoguer::{Confirm, theme::ColorfulTheme};

use crate::{config, prompt::TerminalPrompter, secrets::SecretStore};

#[derive(Debug, Clone, Args)]
pub struct ConfigureCommand {}

impl ConfigureCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        config::configure_interactive(profile).await?;

        let store = SecretStore::keyring();
        let has_login = store.email()?.is_some() && store.password()?.is_some();

        let update = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Store the sign-in email and password in the OS keyring now?")
            .default(!has_login)
            .interact()
            .context("Failed to read keyring preference")?;

        if update {
            super::credentials::update_login(&store, &TerminalPrompter).await?;
        }

        Ok(())
    }
}
