use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::{
    prompt::{Prompter, TerminalPrompter},
    secrets::SecretStore,
};

#[derive(Debug, Clone, Args)]
pub struct CredentialsCommand {
    #[command(subcommand)]
    pub action: CredentialsAction,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CredentialsAction {
    #[command(about = "Prompt for the sign-in email and password and store them")]
    Update,
    #[command(about = "Remove the sign-in email, password and this profile's stored credentials")]
    Clear,
}

impl CredentialsCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        let store = SecretStore::keyring();

        match self.action {
            CredentialsAction::Update => update_login(&store, &TerminalPrompter).await,
            CredentialsAction::Clear => {
                clear(&store, profile)?;
                println!("Removed keyring entries for profile {profile}.");
                Ok(())
            }
        }
    }
}

pub(crate) async fn update_login(store: &SecretStore, prompter: &dyn Prompter) -> Result<()> {
    let email = prompter.email().await?;
    store
        .set_email(&email)
        .context("Failed to store email in the keyring")?;

    let password = prompter.password().await?;
    store
        .set_password(&password)
        .context("Failed to store password in the keyring")?;

    println!("Sign-in credentials for {email} saved to the keyring.");
    Ok(())
}

fn clear(store: &SecretStore, profile: &str) -> Result<()> {
    store
        .clear_login()
        .context("Failed to remove email and password from the keyring")?;
    store
        .delete_credentials(profile)
        .with_context(|| format!("Failed to remove stored credentials for '{profile}'"))
}
